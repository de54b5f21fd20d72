use crux_core::testing::AppTester;
use shared::presenter::LEGEND_TAB;
use shared::{App, Effect, Event, GuideView, Model};

fn active_tab(app: &AppTester<App, Effect>, model: &Model) -> String {
    let vm = app.view(model);
    let active: Vec<_> = vm.tabs.iter().filter(|t| t.active).collect();
    assert_eq!(active.len(), 1, "exactly one tab must be active");
    active[0].label.clone()
}

#[test]
fn test_starts_on_first_crop() {
    let app = AppTester::<App, Effect>::default();
    let model = Model::default();

    let vm = app.view(&model);
    let labels: Vec<_> = vm.tabs.iter().map(|t| t.label.as_str()).collect();
    assert_eq!(
        labels,
        ["Trigo Candeal", "Trigo Pan", "Cebada", "Avena", LEGEND_TAB]
    );
    assert_eq!(active_tab(&app, &model), "Trigo Candeal");
    match vm.guide {
        GuideView::Crop { name, sections, .. } => {
            assert_eq!(name, "Trigo Candeal");
            assert!(sections.iter().all(|s| !s.expanded));
        }
        GuideView::Legend { .. } => panic!("expected crop view"),
    }
}

#[test]
fn test_cebada_then_unknown_falls_back_to_legend() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();

    let update = app.update(Event::TabSelected { name: "Cebada".into() }, &mut model);
    assert!(update.effects.iter().any(|e| matches!(e, Effect::Render(_))));
    assert_eq!(active_tab(&app, &model), "Cebada");

    app.update(Event::TabSelected { name: "Maiz".into() }, &mut model);
    assert_eq!(active_tab(&app, &model), LEGEND_TAB);
    match app.view(&model).guide {
        GuideView::Legend { entries, .. } => {
            let codes: Vec<_> = entries.iter().map(|e| e.code.as_str()).collect();
            assert_eq!(codes, ["K1", "K3", "F1", "C3", "C2", "A", "B", "O", "8"]);
        }
        GuideView::Crop { .. } => panic!("expected legend fallback"),
    }
}

#[test]
fn test_sections_expand_independently() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();

    app.update(Event::TabSelected { name: "Trigo Pan".into() }, &mut model);
    app.update(Event::StageToggled { index: 1 }, &mut model);
    app.update(Event::StageToggled { index: 3 }, &mut model);
    app.update(Event::StageToggled { index: 9 }, &mut model);

    let GuideView::Crop { sections, .. } = app.view(&model).guide else {
        panic!("expected crop view");
    };
    let expanded: Vec<_> = sections.iter().map(|s| s.expanded).collect();
    assert_eq!(expanded, [false, true, false, true]);

    // switching tabs starts collapsed again
    app.update(Event::TabSelected { name: "Avena".into() }, &mut model);
    app.update(Event::TabSelected { name: "Trigo Pan".into() }, &mut model);
    let GuideView::Crop { sections, .. } = app.view(&model).guide else {
        panic!("expected crop view");
    };
    assert!(sections.iter().all(|s| !s.expanded));
}

#[test]
fn test_stage_bodies_are_escaped_html() {
    let app = AppTester::<App, Effect>::default();
    let model = Model::default();

    let GuideView::Crop { sections, .. } = app.view(&model).guide else {
        panic!("expected crop view");
    };
    for section in sections {
        let stripped = section
            .body_html
            .replace("<strong>", "")
            .replace("</strong>", "")
            .replace("<em>", "")
            .replace("</em>", "")
            .replace("<br>", "");
        assert!(!stripped.contains('<'), "{}", section.label);
        assert!(!section.body.lines.is_empty());
    }
}
