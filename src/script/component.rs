use crate::foundation::error::OverlayResult;
use crate::scene::tree::{NodeId, Scene};

/// A running widget produced by compiling its script.
///
/// `mount` is required; `unmount` is optional and reported through [`Component::has_unmount`].
pub trait Component {
    /// Mounts the widget's content into `layer`.
    fn mount(&mut self, layer: NodeId) -> OverlayResult<()>;

    /// Whether the instance exposes an `unmount` hook.
    fn has_unmount(&self) -> bool;

    /// Runs the widget's `unmount` hook. A no-op when [`Component::has_unmount`] is false.
    fn unmount(&mut self) -> OverlayResult<()>;

    /// Advances the widget's frame clock, running due animation frames and timers. Returns the
    /// number of callbacks that ran.
    fn run_frame(&mut self, _now_ms: f64) -> usize {
        0
    }
}

/// What a compilation gets to see of the surface it is compiled for.
#[derive(Clone, Debug)]
pub struct CompileCtx {
    pub scene: Scene,
    /// Surface mount host, exposed to scripts as `ctx.host`.
    pub host: NodeId,
    /// The layer the instance will mount into. Scripts may only mutate nodes inside it or nodes
    /// they created that are still detached.
    pub layer: NodeId,
    /// Style scope (shadow root) the script is confined to.
    pub scope: NodeId,
    /// Widget label used in diagnostics and script console output.
    pub label: String,
}

/// Turns widget script text into a [`Component`].
///
/// Either a fully valid instance is returned or a compile error; nothing is partially applied.
pub trait ModuleCompiler {
    fn compile(&self, script: &str, cx: &CompileCtx) -> OverlayResult<Box<dyn Component>>;
}
