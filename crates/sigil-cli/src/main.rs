use std::fs;
use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Args, Parser, Subcommand};
use image::ImageFormat;
use sigil_contracts::artifact::Artifact;
use sigil_contracts::brief::{Brief, LogoStyle};
use sigil_contracts::chat::{parse_intent, Intent, STUDIO_HELP_COMMANDS};
use sigil_contracts::events::EventWriter;
use sigil_engine::{default_backend_registry, EngineConfig, GenerationError, Session};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "sigil", version, about = "Brand logo generation studio")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate one batch from a brief and write every variant to --out.
    Generate(GenerateArgs),
    /// Interactive session: edit the brief, generate, remix, select, export.
    Studio(StudioArgs),
}

#[derive(Debug, Args)]
struct EngineArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    temperature: Option<f32>,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[command(flatten)]
    engine: EngineArgs,
    /// JSON brief; individual flags override its fields.
    #[arg(long)]
    brief: Option<PathBuf>,
    #[arg(long)]
    brand: Option<String>,
    #[arg(long)]
    tagline: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    style: Option<String>,
    #[arg(long)]
    colors: Option<String>,
    #[arg(long)]
    count: Option<u8>,
    #[arg(long)]
    reference: Option<PathBuf>,
    /// Remix the first variant this many times after the initial batch.
    #[arg(long, default_value_t = 0)]
    remix: u32,
}

#[derive(Debug, Parser)]
struct StudioArgs {
    #[command(flatten)]
    engine: EngineArgs,
    #[arg(long)]
    brief: Option<PathBuf>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("sigil error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Studio(args) => {
            run_studio(args)?;
            Ok(0)
        }
    }
}

fn open_session(args: &EngineArgs) -> Result<Session> {
    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create output dir {}", args.out.display()))?;
    let config = EngineConfig::from_env()
        .with_model(args.model.clone())
        .with_temperature(args.temperature);
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let events = EventWriter::new(events_path, Uuid::new_v4().to_string());
    Session::from_config(&config, &default_backend_registry(&config), events)
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let brief = brief_from_args(&args)?;
    let session = open_session(&args.engine)?;
    session.set_brief(brief);
    println!(
        "Generating with {} ({})",
        session.model().name,
        session.model().provider
    );

    let mut code = 0;
    match session.generate() {
        Ok(batch) => {
            export_batch(&session, &batch, &args.engine.out)?;
            let mut source = batch.first().map(|artifact| artifact.id().to_string());
            for round in 0..args.remix {
                let Some(source_id) = source.clone() else {
                    break;
                };
                match session.remix(&source_id) {
                    Ok(remixed) => {
                        println!("Remix round {} from {}", round + 1, short_id(&source_id));
                        export_batch(&session, &remixed, &args.engine.out)?;
                        source = remixed.first().map(|artifact| artifact.id().to_string());
                    }
                    Err(err) => {
                        report_failure(&session, &err);
                        code = 1;
                        break;
                    }
                }
            }
        }
        Err(err) => {
            report_failure(&session, &err);
            code = 1;
        }
    }

    let summary = session.finish(&args.engine.out.join("summary.json"))?;
    println!(
        "Done: {} artifact(s) in {} batch(es)",
        summary.total_artifacts, summary.total_batches
    );
    Ok(code)
}

fn brief_from_args(args: &GenerateArgs) -> Result<Brief> {
    let mut brief = match args.brief.as_deref() {
        Some(path) => load_brief(path)?,
        None => Brief::default(),
    };
    if let Some(brand) = args.brand.as_deref() {
        brief.brand_name = brand.to_string();
    }
    if let Some(tagline) = args.tagline.as_deref() {
        brief.tagline = Some(tagline.to_string());
    }
    if let Some(description) = args.description.as_deref() {
        brief.description = description.to_string();
    }
    if let Some(style) = args.style.as_deref() {
        brief.style = parse_style(style)?;
    }
    if let Some(colors) = args.colors.as_deref() {
        brief.colors = colors.to_string();
    }
    if let Some(count) = args.count {
        brief.variant_count = count;
    }
    if let Some(reference) = args.reference.as_deref() {
        brief.reference_image = Some(read_image_as_data_uri(reference)?);
    }
    Ok(brief)
}

fn load_brief(path: &Path) -> Result<Brief> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read brief {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid brief JSON in {}", path.display()))
}

fn parse_style(raw: &str) -> Result<LogoStyle> {
    match LogoStyle::parse(raw) {
        Some(style) => Ok(style),
        None => bail!(
            "unknown style '{raw}' (expected one of: {})",
            style_labels().join(", ")
        ),
    }
}

fn style_labels() -> Vec<&'static str> {
    LogoStyle::ALL.iter().map(|style| style.label()).collect()
}

fn export_batch(session: &Session, batch: &[Artifact], dir: &Path) -> Result<()> {
    for artifact in batch {
        let path = session.export(artifact.id(), dir)?;
        println!("  {}  {}", short_id(artifact.id()), path.display());
    }
    Ok(())
}

fn report_failure(session: &Session, err: &GenerationError) {
    let message = session.last_error().unwrap_or_else(|| err.user_message());
    eprintln!("Error: {message}");
}

fn run_studio(args: StudioArgs) -> Result<()> {
    let session = open_session(&args.engine)?;
    if let Some(path) = args.brief.as_deref() {
        session.set_brief(load_brief(path)?);
    }
    println!(
        "Sigil studio started ({}). Type /help for commands.",
        session.model().name
    );

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match input.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        match handle_intent(&session, &intent, &args.engine.out)? {
            Flow::Continue => {}
            Flow::Quit => break,
        }
    }

    let summary = session.finish(&args.engine.out.join("summary.json"))?;
    println!(
        "Session finished: {} artifact(s), {} remix(es).",
        summary.total_artifacts, summary.total_remixes
    );
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn handle_intent(session: &Session, intent: &Intent, out_dir: &Path) -> Result<Flow> {
    match intent.action.as_str() {
        "noop" => {}
        "help" => println!("Commands: {}", STUDIO_HELP_COMMANDS.join(" ")),
        "quit" => return Ok(Flow::Quit),
        "set_brand" => {
            let value = text_arg(intent);
            session.edit_brief(|brief| brief.brand_name = value.clone());
            println!("Brand set to {value}");
        }
        "set_tagline" => {
            let value = text_arg(intent);
            session.edit_brief(|brief| {
                brief.tagline = (!value.is_empty()).then(|| value.clone());
            });
            println!("Tagline set to {value}");
        }
        "set_description" => {
            let value = text_arg(intent);
            session.edit_brief(|brief| brief.description = value.clone());
            println!("Description updated");
        }
        "set_colors" => {
            let value = text_arg(intent);
            session.edit_brief(|brief| brief.colors = value.clone());
            println!("Colors set to {value}");
        }
        "set_style" => match parse_style(&text_arg(intent)) {
            Ok(style) => {
                session.edit_brief(|brief| brief.style = style);
                println!("Style set to {}", style.label());
            }
            Err(err) => println!("{err}"),
        },
        "set_count" => match text_arg(intent).parse::<u8>() {
            Ok(count) => {
                session.edit_brief(|brief| brief.variant_count = count);
                println!(
                    "Variant count set to {}",
                    session.brief().effective_variant_count()
                );
            }
            Err(_) => println!("/count requires a number between 1 and 4"),
        },
        "set_reference" => {
            let Some(path) = intent.arg_str("path") else {
                println!("/reference requires a path");
                return Ok(Flow::Continue);
            };
            match read_image_as_data_uri(Path::new(path)) {
                Ok(uri) => {
                    session.edit_brief(|brief| brief.reference_image = Some(uri));
                    println!("Reference image set to {path}");
                }
                Err(err) => println!("Reference failed: {err:#}"),
            }
        }
        "clear_reference" => {
            session.edit_brief(|brief| brief.reference_image = None);
            println!("Reference image cleared");
        }
        "generate" => {
            println!("Generating...");
            print_outcome(session, session.generate(), out_dir);
        }
        "remix" => {
            let source = intent
                .arg_str("id")
                .map(|id| resolve_id(session, id))
                .or_else(|| session.current().map(|artifact| artifact.id().to_string()));
            let Some(source) = source else {
                println!("/remix requires an artifact id (or generate one first)");
                return Ok(Flow::Continue);
            };
            println!("Remixing {}...", short_id(&source));
            print_outcome(session, session.remix(&source), out_dir);
        }
        "select" => {
            let Some(id) = intent.arg_str("id") else {
                println!("/select requires an artifact id");
                return Ok(Flow::Continue);
            };
            match session.select(&resolve_id(session, id)) {
                Ok(artifact) => println!("Current artifact: {}", short_id(artifact.id())),
                Err(err) => println!("{}", err.user_message()),
            }
        }
        "history" => print_history(session),
        "lineage" => {
            let Some(id) = intent.arg_str("id") else {
                println!("/lineage requires an artifact id");
                return Ok(Flow::Continue);
            };
            print_lineage(session, &resolve_id(session, id));
        }
        "export" => {
            let Some(id) = intent.arg_str("id") else {
                println!("/export requires an artifact id");
                return Ok(Flow::Continue);
            };
            let dir = intent
                .arg_str("dir")
                .map(PathBuf::from)
                .unwrap_or_else(|| out_dir.to_path_buf());
            match session.export(&resolve_id(session, id), &dir) {
                Ok(path) => println!("Exported to {}", path.display()),
                Err(err) => println!("Export failed: {err:#}"),
            }
        }
        "status" => print_status(session),
        "styles" => {
            for style in LogoStyle::ALL {
                println!("  {:<12} {}", style.label(), style.descriptor());
            }
        }
        "unknown" => {
            let command = intent.arg_str("command").unwrap_or_default();
            println!("Unknown command: /{command}. Type /help for commands.");
        }
        other => println!("Unhandled action: {other}"),
    }
    Ok(Flow::Continue)
}

fn text_arg(intent: &Intent) -> String {
    intent
        .arg_str("value")
        .unwrap_or_default()
        .to_string()
}

/// Accepts a full id or a unique prefix of one.
fn resolve_id(session: &Session, raw: &str) -> String {
    let raw = raw.trim();
    session.with_history(|history| {
        if history.contains(raw) {
            return raw.to_string();
        }
        let mut matches = history.iter().filter(|artifact| artifact.id().starts_with(raw));
        match (matches.next(), matches.next()) {
            (Some(only), None) => only.id().to_string(),
            _ => raw.to_string(),
        }
    })
}

fn print_outcome(session: &Session, outcome: Result<Vec<Artifact>, GenerationError>, out_dir: &Path) {
    match outcome {
        Ok(batch) => {
            for artifact in &batch {
                let marker = if session.current().as_ref().map(Artifact::id) == Some(artifact.id()) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{marker} {}  {} {} bytes",
                    short_id(artifact.id()),
                    artifact.image().mime_type(),
                    artifact.image().len()
                );
            }
            println!(
                "{} variant(s) ready. /export <id> writes to {}",
                batch.len(),
                out_dir.display()
            );
        }
        Err(err) => report_failure(session, &err),
    }
}

fn print_history(session: &Session) {
    let current = session.current().map(|artifact| artifact.id().to_string());
    session.with_history(|history| {
        if history.is_empty() {
            println!("No artifacts yet.");
            return;
        }
        for artifact in history.iter() {
            let marker = if current.as_deref() == Some(artifact.id()) {
                "*"
            } else {
                " "
            };
            let parent = artifact
                .parent_id()
                .map(|id| format!(" <- {}", short_id(id)))
                .unwrap_or_default();
            println!(
                "{marker} {}  {}{parent}",
                short_id(artifact.id()),
                artifact.created_at().format("%H:%M:%S")
            );
        }
    });
}

fn print_lineage(session: &Session, id: &str) {
    session.with_history(|history| {
        if !history.contains(id) {
            println!("Unknown artifact: {id}");
            return;
        }
        let chain: Vec<String> = std::iter::once(id)
            .chain(history.lineage(id).into_iter().map(Artifact::id))
            .map(short_id)
            .collect();
        println!("{}", chain.join(" <- "));
        let children = history.children_of(id);
        if !children.is_empty() {
            let names: Vec<String> = children.into_iter().map(|a| short_id(a.id())).collect();
            println!("Variations: {}", names.join(", "));
        }
    });
}

fn print_status(session: &Session) {
    let brief = session.brief();
    println!("Status: {}", session.status().as_str());
    println!("Brand: {}", brief.brand_name);
    if let Some(tagline) = brief.tagline_text() {
        println!("Tagline: {tagline}");
    }
    println!("Description: {}", brief.description);
    println!("Style: {}", brief.style.label());
    println!("Colors: {}", brief.colors);
    println!("Variants: {}", brief.effective_variant_count());
    println!(
        "Reference: {}",
        if brief.reference_image_text().is_some() {
            "set"
        } else {
            "none"
        }
    );
    println!("Artifacts: {}", session.history_len());
    if let Some(current) = session.current() {
        println!("Current: {}", short_id(current.id()));
    }
    if let Some(error) = session.last_error() {
        println!("Error: {error}");
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn read_image_as_data_uri(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read image {}", path.display()))?;
    if bytes.is_empty() {
        bail!("image file is empty: {}", path.display());
    }
    let mime = image::guess_format(&bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or_else(|_| guess_image_mime(path));
    Ok(format!("data:{mime};base64,{}", BASE64.encode(bytes)))
}

fn guess_image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ImageFormat::from_extension(&ext) {
        Some(format) => format.to_mime_type(),
        None => "image/png",
    }
}
