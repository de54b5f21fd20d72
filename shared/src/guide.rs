//! Herbicide recommendations per cereal crop and BBCH growth stage.
//!
//! The table is authored once and compiled into the binary. Stage order is
//! phenological and must be preserved exactly as written.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LegendEntry {
    /// HRAC group code, unique within the legend.
    pub code: &'static str,
    pub desc: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stage {
    /// Growth-stage range label, e.g. `10–14`.
    pub bbch: &'static str,
    pub title: &'static str,
    /// Authored markup; see [`crate::rich_text`] for the allowed subset.
    pub content: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropGuide {
    pub name: &'static str,
    pub stages: &'static [Stage],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct HerbicideGuide {
    pub legend: &'static [LegendEntry],
    pub crops: &'static [CropGuide],
}

impl HerbicideGuide {
    /// Exact, case-sensitive lookup. `None` is the not-found result; callers
    /// fall back to the legend.
    #[must_use]
    pub fn crop(&self, name: &str) -> Option<&'static CropGuide> {
        self.crops.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn legend(&self) -> &'static [LegendEntry] {
        self.legend
    }

    #[must_use]
    pub fn crops(&self) -> &'static [CropGuide] {
        self.crops
    }

    #[must_use]
    pub fn first_crop(&self) -> Option<&'static CropGuide> {
        self.crops.first()
    }

    pub fn crop_names(&self) -> impl Iterator<Item = &'static str> {
        self.crops.iter().map(|c| c.name)
    }

    /// Compact JSON rendering used to ground the assistant.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[must_use]
pub fn guide() -> &'static HerbicideGuide {
    &GUIDE
}

static GUIDE: HerbicideGuide = HerbicideGuide {
    legend: &[
        LegendEntry { code: "K1", desc: "Grupo 3 (trifluralin)" },
        LegendEntry { code: "K3", desc: "Grupo 15 (propisochlor/pyroxasulfone)" },
        LegendEntry { code: "F1", desc: "Grupo 12 (diflufenican)" },
        LegendEntry { code: "C3", desc: "Grupo 6 (bromoxynil)" },
        LegendEntry { code: "C2", desc: "Grupo 5 (isoproturon)" },
        LegendEntry { code: "A", desc: "Grupo 1 (ACCase: pinoxaden, clodinafop, tralkoxydim)" },
        LegendEntry { code: "B", desc: "Grupo 2 (ALS: metsulfuron, triasulfuron, pyroxsulam*)" },
        LegendEntry { code: "O", desc: "Grupo 4 (2,4-D, MCPA)" },
        LegendEntry { code: "8", desc: "Grupo 8 (triallate)" },
    ],
    crops: &[
        CropGuide {
            name: "Trigo Candeal",
            stages: &[
                Stage {
                    bbch: "00–09",
                    title: "Pre-siembra / Pre-emergencia (PPI/PRE)",
                    content: "• <strong>K1</strong> Trifluralin → TREFLAN® EC<br>• <strong>K3+F1</strong> Propisochlor + Diflufenican → BINOMIO® 230 EC<br>• <strong>8</strong> Triallate → (si disponible)",
                },
                Stage {
                    bbch: "10–14",
                    title: "Post-emergencia Temprana (1–4 hojas)",
                    content: "• <strong>F1</strong> Diflufenican → VIVAZ® 500 SC<br>• <strong>C3+O</strong> Bromoxynil + MCPA → MCPA 750 SL + bromoxynil comercial<br>• <strong>B</strong> ALS (metsulfuron/triasulfuron) → LOGRAN® 75 WG<br>• <strong>A</strong> ACCase (gramíneas) → AXIAL® 050 EC",
                },
                Stage {
                    bbch: "20–29",
                    title: "Macollaje (Tillering)",
                    content: "• <strong>A</strong> ACCase → AXIAL® 050 EC | TOPIK® 240 EC<br>• <strong>B</strong> ALS → LOGRAN® 75 WG / productos con pyroxsulam*<br>• <strong>O</strong> 2,4-D / MCPA → ARCO® 2,4-D 480 SL / MCPA 750 SL<br>• <strong>C3</strong> Bromoxynil → BROMOTRIL®<br><em>Secuencia sugerida: A → (7–10 d) → O o C3+O</em>",
                },
                Stage {
                    bbch: "30–32",
                    title: "Inicio Encañado",
                    content: "Ventanas estrechas; respetar etiquetas: A (acotado), O (cuidar estado), B (solo si permitido)",
                },
            ],
            note: Some("No usar en DURUM: C2 Isoproturon (p.ej. FUEGO® 50 SC) por fitotoxicidad histórica."),
        },
        CropGuide {
            name: "Trigo Pan",
            stages: &[
                Stage {
                    bbch: "00–09",
                    title: "PPI/PRE",
                    content: "• <strong>K1</strong> TREFLAN® EC<br>• <strong>K3+F1</strong> BINOMIO® 230 EC<br>• <strong>C2</strong> FUEGO® 50 SC (isoproturon)",
                },
                Stage {
                    bbch: "10–14",
                    title: "Post-emergencia Temprana",
                    content: "• <strong>F1</strong> VIVAZ® 500 SC<br>• <strong>C3+O</strong> Bromoxynil + MCPA<br>• <strong>B</strong> ALS → LOGRAN® 75 WG<br>• <strong>A</strong> ACCase → AXIAL® 050 EC / TOPIK® 240 EC",
                },
                Stage {
                    bbch: "20–29",
                    title: "Macollaje",
                    content: "• <strong>A</strong> ACCase → AXIAL® / TOPIK®<br>• <strong>B</strong> ALS mixes<br>• <strong>O</strong> 2,4-D / MCPA<br>• <strong>C3</strong> Bromoxynil",
                },
                Stage {
                    bbch: "30–32",
                    title: "Inicio Encañado",
                    content: "A (ventana estrecha) | O (cuidado de timing) | B (algunas ventanas cierran—seguir etiqueta)",
                },
            ],
            note: None,
        },
        CropGuide {
            name: "Cebada",
            stages: &[
                Stage {
                    bbch: "00–09",
                    title: "PPI/PRE",
                    content: "• <strong>K1</strong> TREFLAN® EC<br>• <strong>K3+F1</strong> BINOMIO® 230 EC",
                },
                Stage {
                    bbch: "10–14",
                    title: "Post-emergencia Temprana",
                    content: "• <strong>F1</strong> VIVAZ® 500 SC<br>• <strong>C3+O</strong> (MCPA 750 SL + bromoxynil)<br>• <strong>A</strong> DIMs (p.ej. tralkoxydim)*<br><em>*Ver etiqueta específica para cebada.</em>",
                },
                Stage {
                    bbch: "20–29",
                    title: "Macollaje",
                    content: "• <strong>A</strong> (preferir DIMs en cebada)<br>• <strong>O</strong><br>• <strong>C3</strong>",
                },
                Stage {
                    bbch: "30–32",
                    title: "Inicio Encañado",
                    content: "Ventanas muy acotadas; revisar etiqueta antes de aplicar",
                },
            ],
            note: None,
        },
        CropGuide {
            name: "Avena",
            stages: &[
                Stage {
                    bbch: "00–09",
                    title: "PPI/PRE",
                    content: "• <strong>K1</strong> TREFLAN® EC<br>• <strong>8</strong> Triallate (si disponible/etiqueta)",
                },
                Stage {
                    bbch: "10–14",
                    title: "Post-emergencia Temprana",
                    content: "• <strong>O</strong> (MCPA 750 SL)<br>• <strong>C3</strong> (bromoxynil)<br><em>(ACCase generalmente NO selectivo en avena)</em>",
                },
                Stage {
                    bbch: "20–29",
                    title: "Macollaje",
                    content: "• <strong>O + C3</strong> limpiezas<br>• ALS limitado—revisar etiquetas locales",
                },
                Stage {
                    bbch: "30–32",
                    title: "Inicio Encañado",
                    content: "Ventanas post se cierran; priorizar aplicaciones tempranas",
                },
            ],
            note: None,
        },
    ],
};
