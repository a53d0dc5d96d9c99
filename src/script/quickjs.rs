use std::rc::Rc;

use rquickjs::function::This;
use rquickjs::{CatchResultExt, Context, Ctx, Function, Object, Persistent, Runtime, Value};

use crate::foundation::error::{OverlayError, OverlayResult};
use crate::scene::tree::NodeId;
use crate::script::bridge::{HostBridge, PRELUDE, install_host};
use crate::script::component::{CompileCtx, Component, ModuleCompiler};
use crate::script::module::wrap_module;

const INSTANCE_SHAPE: &str = "overlay must export default function returning { mount, unmount }";

/// Upper bound on promise jobs drained after one host call into a widget.
///
/// The job queue belongs to the runtime, which every widget compiled by the same
/// [`QuickJsCompiler`] shares. The budget therefore covers jobs queued by any of those widgets,
/// not just the one being called.
const MAX_JOBS_PER_TURN: usize = 1024;

/// Frames between full garbage collections. Acyclic wrappers are freed as soon as they are
/// dropped; the periodic pass picks up cycles so their detached nodes can be swept.
const GC_EVERY_FRAMES: u32 = 32;

/// Module compiler backed by an embedded QuickJS runtime.
///
/// All compilations share one runtime; each gets its own context, so globals never leak between
/// widgets.
pub struct QuickJsCompiler {
    runtime: Runtime,
}

impl QuickJsCompiler {
    pub fn new() -> OverlayResult<Self> {
        let runtime = Runtime::new()
            .map_err(|e| OverlayError::compile(format!("create script runtime: {e}")))?;
        Ok(Self { runtime })
    }
}

fn caught<'js, T>(
    ctx: &Ctx<'js>,
    res: rquickjs::Result<T>,
    kind: fn(String) -> OverlayError,
    what: &str,
) -> OverlayResult<T> {
    res.catch(ctx).map_err(|e| kind(format!("{what}: {e}")))
}

/// `exports.default` wins over the raw export value when present.
fn default_export<'js>(exported: Value<'js>) -> Value<'js> {
    if let Some(obj) = exported.as_object()
        && let Ok(v) = obj.get::<_, Value>("default")
        && !v.is_undefined()
        && !v.is_null()
    {
        return v;
    }
    exported
}

fn validate_instance<'js>(ctx: &Ctx<'js>, candidate: Value<'js>) -> OverlayResult<Object<'js>> {
    let Some(obj) = candidate.into_object() else {
        return Err(OverlayError::compile(INSTANCE_SHAPE));
    };
    let mount: Value = caught(ctx, obj.get("mount"), OverlayError::Compile, "read mount")?;
    if !mount.is_function() {
        return Err(OverlayError::compile(INSTANCE_SHAPE));
    }
    Ok(obj)
}

struct Handles {
    instance: Persistent<Object<'static>>,
    wrap: Persistent<Function<'static>>,
    run_frame: Persistent<Function<'static>>,
}

impl ModuleCompiler for QuickJsCompiler {
    #[tracing::instrument(skip_all, fields(widget = %cx.label))]
    fn compile(&self, script: &str, cx: &CompileCtx) -> OverlayResult<Box<dyn Component>> {
        let context = Context::full(&self.runtime)
            .map_err(|e| OverlayError::compile(format!("create script context: {e}")))?;
        let bridge = Rc::new(HostBridge::new(cx));
        let source = wrap_module(script);

        let handles = context.with(|ctx| -> OverlayResult<Handles> {
            let native = caught(
                &ctx,
                install_host(&ctx, bridge.clone()),
                OverlayError::Compile,
                "install host bindings",
            )?;
            let setup: Function = caught(
                &ctx,
                ctx.eval(PRELUDE),
                OverlayError::Compile,
                "evaluate prelude",
            )?;
            let api: Object = caught(
                &ctx,
                setup.call((native,)),
                OverlayError::Compile,
                "run prelude",
            )?;
            let wrap: Function =
                caught(&ctx, api.get("wrap"), OverlayError::Compile, "read prelude")?;
            let run_frame: Function =
                caught(&ctx, api.get("runFrame"), OverlayError::Compile, "read prelude")?;

            let script_ctx = caught(
                &ctx,
                Object::new(ctx.clone()),
                OverlayError::Compile,
                "build ctx",
            )?;
            let host: Value = caught(
                &ctx,
                wrap.call((cx.host.0,)),
                OverlayError::Compile,
                "wrap host",
            )?;
            caught(
                &ctx,
                script_ctx.set("host", host),
                OverlayError::Compile,
                "build ctx",
            )?;
            caught(
                &ctx,
                script_ctx.set("widget", cx.label.as_str()),
                OverlayError::Compile,
                "build ctx",
            )?;

            let module_fn: Function = caught(
                &ctx,
                ctx.eval(source),
                OverlayError::Compile,
                "evaluate script",
            )?;
            let exports = caught(
                &ctx,
                Object::new(ctx.clone()),
                OverlayError::Compile,
                "build module",
            )?;
            let module = caught(
                &ctx,
                Object::new(ctx.clone()),
                OverlayError::Compile,
                "build module",
            )?;
            caught(
                &ctx,
                module.set("exports", exports.clone()),
                OverlayError::Compile,
                "build module",
            )?;
            let exported: Value = caught(
                &ctx,
                module_fn.call((exports, module, script_ctx.clone())),
                OverlayError::Compile,
                "evaluate script",
            )?;

            let resolved = default_export(exported);
            let candidate = match resolved.clone().into_function() {
                Some(factory) => caught(
                    &ctx,
                    factory.call::<_, Value>((script_ctx,)),
                    OverlayError::Compile,
                    "run widget factory",
                )?,
                None => resolved,
            };
            let instance = validate_instance(&ctx, candidate)?;

            Ok(Handles {
                instance: Persistent::save(&ctx, instance),
                wrap: Persistent::save(&ctx, wrap),
                run_frame: Persistent::save(&ctx, run_frame),
            })
        })?;

        tracing::debug!("compiled widget script");
        Ok(Box::new(ScriptInstance {
            instance: handles.instance,
            wrap: handles.wrap,
            run_frame: handles.run_frame,
            label: cx.label.clone(),
            bridge,
            frames_since_gc: 0,
            context,
            runtime: self.runtime.clone(),
        }))
    }
}

/// A compiled widget living in its own script context.
pub struct ScriptInstance {
    // Persistent handles are released before the context that owns their values.
    instance: Persistent<Object<'static>>,
    wrap: Persistent<Function<'static>>,
    run_frame: Persistent<Function<'static>>,
    label: String,
    bridge: Rc<HostBridge>,
    frames_since_gc: u32,
    context: Context,
    runtime: Runtime,
}

impl ScriptInstance {
    /// Drains the shared runtime's job queue, which may hold jobs from other widgets too.
    fn drain_jobs(&self) {
        for _ in 0..MAX_JOBS_PER_TURN {
            if !self.runtime.is_job_pending() {
                return;
            }
            if self.runtime.execute_pending_job().is_err() {
                tracing::warn!(widget = %self.label, "pending promise job raised an exception");
            }
        }
        tracing::warn!(
            widget = %self.label,
            "promise job budget exhausted for this turn; jobs stay queued on the shared runtime"
        );
    }

    /// Ends a host turn: collects garbage when asked, runs queued jobs (wrapper finalizers
    /// included), then frees detached nodes the script can no longer reach.
    fn settle(&mut self, collect: bool) {
        if collect {
            self.runtime.run_gc();
        }
        self.drain_jobs();
        self.bridge.sweep();
    }

    fn hook(&self, name: &str, kind: fn(String) -> OverlayError) -> OverlayResult<()> {
        self.context.with(|ctx| {
            let instance = caught(
                &ctx,
                self.instance.clone().restore(&ctx),
                kind,
                "restore instance",
            )?;
            let hook: Value = caught(&ctx, instance.get(name), kind, name)?;
            let Some(hook) = hook.into_function() else {
                return Ok(());
            };
            caught(
                &ctx,
                hook.call::<_, Value>((This(instance),)),
                kind,
                name,
            )
            .map(|_| ())
        })
    }
}

impl Component for ScriptInstance {
    fn mount(&mut self, layer: NodeId) -> OverlayResult<()> {
        let res = self.context.with(|ctx| {
            let instance = caught(
                &ctx,
                self.instance.clone().restore(&ctx),
                OverlayError::Mount,
                "restore instance",
            )?;
            let wrap = caught(
                &ctx,
                self.wrap.clone().restore(&ctx),
                OverlayError::Mount,
                "restore prelude",
            )?;
            let el: Value = caught(&ctx, wrap.call((layer.0,)), OverlayError::Mount, "wrap layer")?;
            let mount: Function =
                caught(&ctx, instance.get("mount"), OverlayError::Mount, "mount")?;
            caught(
                &ctx,
                mount.call::<_, Value>((This(instance), el)),
                OverlayError::Mount,
                "mount",
            )
            .map(|_| ())
        });
        self.settle(false);
        res
    }

    fn has_unmount(&self) -> bool {
        self.context.with(|ctx| {
            self.instance
                .clone()
                .restore(&ctx)
                .and_then(|o| o.get::<_, Value>("unmount"))
                .map(|v| v.is_function())
                .unwrap_or(false)
        })
    }

    fn unmount(&mut self) -> OverlayResult<()> {
        let res = self.hook("unmount", OverlayError::Unmount);
        self.settle(false);
        res
    }

    fn run_frame(&mut self, now_ms: f64) -> usize {
        let ran = self.context.with(|ctx| {
            let run = caught(
                &ctx,
                self.run_frame.clone().restore(&ctx),
                OverlayError::Mount,
                "restore prelude",
            )?;
            caught(&ctx, run.call::<_, u32>((now_ms,)), OverlayError::Mount, "run frame")
        });
        self.frames_since_gc += 1;
        let collect = self.frames_since_gc >= GC_EVERY_FRAMES;
        if collect {
            self.frames_since_gc = 0;
        }
        self.settle(collect);
        match ran {
            Ok(n) => n as usize,
            Err(e) => {
                tracing::warn!(widget = %self.label, "frame pump failed: {e}");
                0
            }
        }
    }
}
