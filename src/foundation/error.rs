pub type OverlayResult<T> = Result<T, OverlayError>;

#[derive(thiserror::Error, Debug)]
pub enum OverlayError {
    /// Widget script text did not yield a valid instance.
    #[error("compile error: {0}")]
    Compile(String),

    /// The instance's `mount` raised.
    #[error("mount error: {0}")]
    Mount(String),

    /// The instance's `unmount` raised during teardown.
    #[error("unmount error: {0}")]
    Unmount(String),

    #[error("overlay root is not available")]
    RootUnavailable,

    #[error("scene error: {0}")]
    Scene(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OverlayError {
    pub fn compile(msg: impl Into<String>) -> Self {
        Self::Compile(msg.into())
    }

    pub fn mount(msg: impl Into<String>) -> Self {
        Self::Mount(msg.into())
    }

    pub fn unmount(msg: impl Into<String>) -> Self {
        Self::Unmount(msg.into())
    }

    pub fn scene(msg: impl Into<String>) -> Self {
        Self::Scene(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Re-tags an error raised while tearing a widget down. Whatever went wrong inside `unmount`
    /// is reported as [`OverlayError::Unmount`], keeping the original message.
    pub fn into_unmount(self) -> Self {
        match self {
            Self::Unmount(_) => self,
            other => Self::Unmount(other.to_string()),
        }
    }

    /// Whether this error belongs to one widget rather than to the whole load.
    pub fn is_widget_failure(&self) -> bool {
        matches!(self, Self::Compile(_) | Self::Mount(_) | Self::Unmount(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_errors_are_reported_as_unmount() {
        let from_scene = OverlayError::scene("node #4 does not exist").into_unmount();
        match &from_scene {
            OverlayError::Unmount(msg) => assert_eq!(msg, "scene error: node #4 does not exist"),
            other => panic!("unexpected variant: {other:?}"),
        }

        let already = OverlayError::unmount("cleanup failed").into_unmount();
        assert_eq!(already.to_string(), "unmount error: cleanup failed");
    }

    #[test]
    fn stage_prefixes_tell_compile_from_mount() {
        let compile = OverlayError::compile("run widget factory: Error: nope").to_string();
        let mount = OverlayError::mount("mount: Error: nope").to_string();
        assert!(compile.starts_with("compile error:"), "{compile}");
        assert!(mount.starts_with("mount error:"), "{mount}");
        assert!(!mount.contains("compile"));
    }

    #[test]
    fn root_and_scene_errors_are_not_widget_failures() {
        assert!(OverlayError::compile("x").is_widget_failure());
        assert!(OverlayError::mount("x").is_widget_failure());
        assert!(OverlayError::unmount("x").into_unmount().is_widget_failure());
        assert!(!OverlayError::RootUnavailable.is_widget_failure());
        assert!(!OverlayError::scene("x").is_widget_failure());
        let other: OverlayError = anyhow::anyhow!("read overlay.json").into();
        assert!(!other.is_widget_failure());
        assert_eq!(other.to_string(), "read overlay.json");
    }
}
