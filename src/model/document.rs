use std::collections::BTreeSet;
use std::path::Path;

use crate::foundation::error::{OverlayError, OverlayResult};
use crate::model::widget::WidgetDefinition;

/// A named overlay: the widget set the host stores and hands to the reconciler.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct OverlayDocument {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub widgets: Vec<WidgetDefinition>,
}

impl OverlayDocument {
    pub fn from_json_str(s: &str) -> OverlayResult<Self> {
        serde_json::from_str(s).map_err(|e| OverlayError::serde(e.to_string()))
    }

    pub fn from_json_file(path: &Path) -> OverlayResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            OverlayError::Other(anyhow::Error::new(e).context(format!(
                "read overlay document '{}'",
                path.display()
            )))
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> OverlayResult<()> {
        if self.id.trim().is_empty() {
            return Err(OverlayError::validation("overlay id must be non-empty"));
        }

        let mut seen = BTreeSet::new();
        for w in &self.widgets {
            if w.id.as_str().trim().is_empty() {
                return Err(OverlayError::validation(format!(
                    "overlay '{}' has a widget with an empty id",
                    self.id
                )));
            }
            if !seen.insert(w.id.as_str()) {
                return Err(OverlayError::validation(format!(
                    "overlay '{}' has duplicate widget id '{}'",
                    self.id, w.id
                )));
            }
        }

        Ok(())
    }

    pub fn enabled_widgets(&self) -> impl Iterator<Item = &WidgetDefinition> {
        self.widgets.iter().filter(|w| w.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_doc() -> OverlayDocument {
        OverlayDocument {
            id: "main".to_string(),
            name: "Main overlay".to_string(),
            widgets: vec![
                WidgetDefinition::starter("clock", "Clock"),
                WidgetDefinition::new("lower-third", "", "").with_enabled(false),
            ],
        }
    }

    #[test]
    fn json_roundtrip() {
        let doc = basic_doc();
        let s = serde_json::to_string_pretty(&doc).unwrap();
        let de = OverlayDocument::from_json_str(&s).unwrap();
        assert_eq!(de.widgets.len(), 2);
        assert_eq!(de.widgets[0].name, "Clock");
        assert!(!de.widgets[1].enabled);
    }

    #[test]
    fn validate_rejects_duplicate_ids() {
        let mut doc = basic_doc();
        doc.widgets[1].id = doc.widgets[0].id.clone();
        assert!(doc.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_widget_id() {
        let mut doc = basic_doc();
        doc.widgets[0].id = "".into();
        assert!(doc.validate().is_err());
    }

    #[test]
    fn enabled_widgets_skips_disabled() {
        let doc = basic_doc();
        let ids: Vec<_> = doc.enabled_widgets().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, ["clock"]);
    }

    #[test]
    fn malformed_json_is_a_serde_error() {
        let err = OverlayDocument::from_json_str("{").unwrap_err();
        assert!(matches!(err, OverlayError::Serde(_)));
    }
}
