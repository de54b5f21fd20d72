//! Tab strip and accordion over the herbicide guide.

use std::collections::BTreeSet;

use tracing::debug;

use crate::guide::{guide, CropGuide, LegendEntry};
use crate::rich_text::parse_stage_markup;
use crate::{GuideView, LegendLineView, StageSectionView, TabView};

/// Name of the legend pseudo-tab.
pub const LEGEND_TAB: &str = "Leyenda";
pub const LEGEND_HEADING: &str = "Leyenda (Grupos HRAC)";

/// What the active tab resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Crop(&'static CropGuide),
    Legend(&'static [LegendEntry]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuideSelection {
    active: String,
    expanded: BTreeSet<usize>,
}

impl Default for GuideSelection {
    fn default() -> Self {
        Self {
            active: guide()
                .first_crop()
                .map_or(LEGEND_TAB, |c| c.name)
                .to_string(),
            expanded: BTreeSet::new(),
        }
    }
}

impl GuideSelection {
    #[must_use]
    pub fn active(&self) -> &str {
        &self.active
    }

    #[must_use]
    pub fn is_expanded(&self, index: usize) -> bool {
        self.expanded.contains(&index)
    }

    /// Any name is accepted; names that are not crops render the legend.
    pub fn select_tab(&mut self, name: impl Into<String>) {
        let name = name.into();
        if name != self.active {
            self.expanded.clear();
            self.active = name;
        }
    }

    pub fn toggle_stage(&mut self, index: usize) {
        let Resolved::Crop(crop) = self.resolve() else {
            debug!(index, "stage toggle ignored outside a crop tab");
            return;
        };
        if index >= crop.stages.len() {
            debug!(index, crop = crop.name, "stage toggle out of range");
            return;
        }
        if !self.expanded.remove(&index) {
            self.expanded.insert(index);
        }
    }

    #[must_use]
    pub fn resolve(&self) -> Resolved {
        match guide().crop(&self.active) {
            Some(crop) => Resolved::Crop(crop),
            None => Resolved::Legend(guide().legend()),
        }
    }
}

/// Every crop in table order, then the legend. Exactly one is active.
#[must_use]
pub fn build_tabs(selection: &GuideSelection) -> Vec<TabView> {
    let legend_active = matches!(selection.resolve(), Resolved::Legend(_));
    guide()
        .crop_names()
        .map(|name| TabView {
            label: name.to_string(),
            active: name == selection.active(),
        })
        .chain(std::iter::once(TabView {
            label: LEGEND_TAB.to_string(),
            active: legend_active,
        }))
        .collect()
}

#[must_use]
pub fn build_guide_view(selection: &GuideSelection) -> GuideView {
    match selection.resolve() {
        Resolved::Crop(crop) => GuideView::Crop {
            name: crop.name.to_string(),
            sections: crop
                .stages
                .iter()
                .enumerate()
                .map(|(index, stage)| {
                    let body = parse_stage_markup(stage.content);
                    StageSectionView {
                        index,
                        label: format!("{} - {}", stage.bbch, stage.title),
                        expanded: selection.is_expanded(index),
                        body_html: body.to_html(),
                        body,
                    }
                })
                .collect(),
            note: crop.note.map(str::to_string),
        },
        Resolved::Legend(entries) => GuideView::Legend {
            heading: LEGEND_HEADING.to_string(),
            entries: entries
                .iter()
                .map(|e| LegendLineView {
                    code: e.code.to_string(),
                    desc: e.desc.to_string(),
                    line: format!("{} = {}", e.code, e.desc),
                })
                .collect(),
        },
    }
}
