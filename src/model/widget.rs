use std::borrow::Borrow;
use std::fmt;

/// Stable widget identity, unique within one overlay.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct WidgetId(pub String);

impl WidgetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WidgetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for WidgetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for WidgetId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A user-authored widget as supplied by the host on every reconciliation pass.
///
/// The runtime never mutates or persists these; only `id` is treated as stable.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WidgetDefinition {
    pub id: WidgetId,
    #[serde(default)]
    pub name: String,
    #[serde(alias = "js", default)]
    pub script: String,
    #[serde(alias = "css", default)]
    pub stylesheet: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(alias = "zIndex", default)]
    pub z_order: i32,
}

fn default_enabled() -> bool {
    true
}

pub const STARTER_WIDGET_SCRIPT: &str = r#"export default function Widget(ctx) {
  let raf = 0
  return {
    mount(el) {
      const span = document.createElement('div')
      span.className = 'widget-element'
      el.appendChild(span)
      const tick = () => {
        span.textContent = new Date().toLocaleTimeString()
        raf = requestAnimationFrame(tick)
      }
      tick()
    },
    unmount() {
      cancelAnimationFrame(raf)
    }
  }
}
"#;

pub const STARTER_WIDGET_STYLESHEET: &str = r#".widget-element {
  position: absolute;
  top: 16px;
  right: 16px;
  padding: 8px 12px;
  border-radius: 10px;
  background: rgba(0,0,0,0.55);
  color: #e5ecff;
  font-family: "SFMono-Regular", Consolas, monospace;
  font-size: 16px;
  pointer-events: none;
}
"#;

impl WidgetDefinition {
    pub fn new(
        id: impl Into<WidgetId>,
        script: impl Into<String>,
        stylesheet: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.0.clone(),
            id,
            script: script.into(),
            stylesheet: stylesheet.into(),
            enabled: true,
            z_order: 0,
        }
    }

    /// The clock widget a freshly created widget starts from.
    pub fn starter(id: impl Into<WidgetId>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::new(id, STARTER_WIDGET_SCRIPT, STARTER_WIDGET_STYLESHEET)
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_z_order(mut self, z_order: i32) -> Self {
        self.z_order = z_order;
        self
    }

    /// Display label used in diagnostics.
    pub fn label(&self) -> &str {
        if self.name.trim().is_empty() {
            self.id.as_str()
        } else {
            &self.name
        }
    }

    /// Content fingerprint over the fields that require a remount when they change.
    pub fn content_fingerprint(&self) -> u64 {
        let mut h = xxhash_rust::xxh3::Xxh3::new();
        h.update(&(self.script.len() as u64).to_le_bytes());
        h.update(self.script.as_bytes());
        h.update(self.stylesheet.as_bytes());
        h.digest()
    }
}

/// Stable sort by `z_order`, lowest painted first.
pub fn sort_for_stacking(widgets: &mut [WidgetDefinition]) {
    widgets.sort_by_key(|w| w.z_order);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_host_field_aliases() {
        let w: WidgetDefinition = serde_json::from_str(
            r#"{"id":"clock","name":"Clock","js":"export default {}","css":".a{}","zIndex":3}"#,
        )
        .unwrap();
        assert_eq!(w.id, WidgetId::from("clock"));
        assert_eq!(w.script, "export default {}");
        assert_eq!(w.stylesheet, ".a{}");
        assert_eq!(w.z_order, 3);
        assert!(w.enabled);
    }

    #[test]
    fn fingerprint_tracks_script_and_stylesheet_only() {
        let a = WidgetDefinition::new("a", "x", "y");
        let renamed = WidgetDefinition {
            name: "other".to_string(),
            z_order: 9,
            ..a.clone()
        };
        assert_eq!(a.content_fingerprint(), renamed.content_fingerprint());

        let restyled = WidgetDefinition::new("a", "x", "z");
        assert_ne!(a.content_fingerprint(), restyled.content_fingerprint());

        // Moving bytes across the script/stylesheet boundary is a different widget.
        let shifted = WidgetDefinition::new("a", "xy", "");
        let base = WidgetDefinition::new("a", "x", "y");
        assert_ne!(base.content_fingerprint(), shifted.content_fingerprint());
    }

    #[test]
    fn stacking_sort_is_stable() {
        let mut ws = vec![
            WidgetDefinition::new("a", "", "").with_z_order(2),
            WidgetDefinition::new("b", "", "").with_z_order(1),
            WidgetDefinition::new("c", "", "").with_z_order(2),
            WidgetDefinition::new("d", "", "").with_z_order(1),
        ];
        sort_for_stacking(&mut ws);
        let ids: Vec<_> = ws.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, ["b", "d", "a", "c"]);
    }

    #[test]
    fn label_falls_back_to_id() {
        let mut w = WidgetDefinition::new("w1", "", "");
        w.name = "  ".to_string();
        assert_eq!(w.label(), "w1");
    }
}
