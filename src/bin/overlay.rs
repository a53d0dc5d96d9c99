use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use overlay_runtime::{
    ElementIdRoot, JsonFileMountStore, ModuleCompiler, MountRegistry, OverlayDocument,
    OverlayReconciler, OverlayRuntime, QuickJsCompiler, ReconcilerOpts, Scene, SurfaceManager,
};

const ROOT_ELEMENT_ID: &str = "overlay-root";

#[derive(Parser, Debug)]
#[command(name = "overlay", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mount every enabled widget of an overlay document and print the resulting scene as JSON.
    Apply(ApplyArgs),
    /// Compile and mount a single widget, reporting compile and mount errors.
    Preview(PreviewArgs),
}

#[derive(Parser, Debug)]
struct ApplyArgs {
    /// Input overlay document JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Animation frames to pump before printing.
    #[arg(long, default_value_t = 0)]
    frames: u32,

    /// Frame interval in milliseconds.
    #[arg(long, default_value_t = 16.0)]
    frame_ms: f64,

    /// Stack widgets by z-order instead of document order.
    #[arg(long)]
    sort_z: bool,

    /// Record mount transitions as a JSON `{ id: mounted }` map.
    #[arg(long)]
    status_out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct PreviewArgs {
    /// Widget script.
    #[arg(long)]
    script: PathBuf,

    /// Widget stylesheet.
    #[arg(long)]
    css: Option<PathBuf>,

    /// Animation frames to pump before printing.
    #[arg(long, default_value_t = 0)]
    frames: u32,

    /// Frame interval in milliseconds.
    #[arg(long, default_value_t = 16.0)]
    frame_ms: f64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Apply(args) => cmd_apply(args),
        Command::Preview(args) => cmd_preview(args),
    }
}

fn read_text(path: &Path, what: &str) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("read {what} '{}'", path.display()))
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    let s = serde_json::to_string_pretty(value).context("serialize scene snapshot")?;
    println!("{s}");
    Ok(())
}

fn cmd_apply(args: ApplyArgs) -> anyhow::Result<()> {
    let doc = OverlayDocument::from_json_file(&args.in_path)?;
    doc.validate()?;

    let scene = Scene::new();
    scene.create_root(ROOT_ELEMENT_ID)?;
    let compiler: Rc<dyn ModuleCompiler> = Rc::new(QuickJsCompiler::new()?);
    let mut reconciler = OverlayReconciler::new(
        scene.clone(),
        compiler,
        ElementIdRoot::new(scene.clone(), ROOT_ELEMENT_ID),
        MountRegistry::new(),
    )
    .with_opts(ReconcilerOpts {
        sort_by_z_order: args.sort_z,
    });
    if let Some(path) = &args.status_out {
        reconciler = reconciler.with_store(JsonFileMountStore::new(path));
    }

    let report = reconciler.load(&doc.widgets)?;
    for f in &report.failed {
        eprintln!("widget '{}' ({}) failed: {}", f.id, f.name, f.message);
    }

    for i in 1..=args.frames {
        reconciler.run_frame(f64::from(i) * args.frame_ms);
    }

    let snapshot = {
        let tree = scene.borrow();
        tree.snapshot(tree.document())?
    };
    print_json(&snapshot)?;

    eprintln!(
        "overlay '{}': {} mounted, {} failed",
        doc.id,
        report.mounted.len(),
        report.failed.len()
    );
    reconciler.unload_all();
    Ok(())
}

fn cmd_preview(args: PreviewArgs) -> anyhow::Result<()> {
    let script = read_text(&args.script, "widget script")?;
    let css = match &args.css {
        Some(p) => read_text(p, "widget stylesheet")?,
        None => String::new(),
    };

    let scene = Scene::new();
    let root = scene.create_root(ROOT_ELEMENT_ID)?;
    let container = {
        let mut tree = scene.borrow_mut();
        let c = tree.create_element("div");
        tree.set_attr(c, "id", "widget-preview")?;
        tree.append_child(root, c)?;
        c
    };

    let compiler: Rc<dyn ModuleCompiler> = Rc::new(QuickJsCompiler::new()?);
    let label = args
        .script
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "preview".to_string());
    let mut runtime =
        OverlayRuntime::attach(&SurfaceManager::new(scene.clone()), compiler, container, label)?;
    runtime
        .apply(&script, &css)
        .with_context(|| format!("preview '{}'", args.script.display()))?;

    for i in 1..=args.frames {
        runtime.run_frame(f64::from(i) * args.frame_ms);
    }

    let snapshot = scene.borrow().snapshot(container)?;
    print_json(&snapshot)?;
    runtime.destroy();
    Ok(())
}
