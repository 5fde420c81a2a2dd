use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use imagix_contracts::history::HistoryItem;
use imagix_contracts::params::{AspectRatio, ImageResolution};
use imagix_contracts::request::{camera_descriptor, EnhanceRequest};
use imagix_contracts::session::PlanTier;
use imagix_engine::files::{load_image_file, write_data_url};
use imagix_engine::{EngineConfig, GenerateOptions, Studio};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "imagix", version, about = "Prompt enhancement and tiered image generation")]
struct Cli {
    /// Directory holding session, history and event log.
    #[arg(long, global = true, default_value = ".imagix")]
    state: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rewrite a raw idea into a detailed prompt.
    Enhance(EnhanceArgs),
    Generate(GenerateArgs),
    /// Edit the displayed image inside a mask.
    Edit(EditArgs),
    #[command(subcommand)]
    Prompt(PromptCommand),
    #[command(subcommand)]
    History(HistoryCommand),
    #[command(subcommand)]
    Plan(PlanCommand),
    #[command(subcommand)]
    Profile(ProfileCommand),
}

#[derive(Debug, Parser)]
struct EnhanceArgs {
    #[arg(long, default_value = "")]
    idea: String,
    #[arg(long = "ref")]
    references: Vec<PathBuf>,
    #[arg(long)]
    style: Option<String>,
    #[arg(long)]
    angle: Option<String>,
    #[arg(long)]
    lens: Option<String>,
    #[arg(long)]
    assisted: bool,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    /// Defaults to the current prompt history entry.
    #[arg(long)]
    prompt: Option<String>,
    /// Image file or `data:` URL.
    #[arg(long = "ref")]
    references: Vec<String>,
    #[arg(long)]
    style: Option<String>,
    #[arg(long)]
    angle: Option<String>,
    #[arg(long)]
    lens: Option<String>,
    #[arg(long, default_value = "1:1")]
    aspect: AspectRatio,
    #[arg(long, default_value = "1K")]
    resolution: ImageResolution,
    /// Ground the generation with web search.
    #[arg(long)]
    search: bool,
    #[arg(long, default_value_t = 1)]
    count: u32,
    #[arg(long)]
    variation: bool,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    mask: PathBuf,
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    style: Option<String>,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum PromptCommand {
    Set { text: String },
    /// Read successive drafts from stdin, one per line; pauses longer than
    /// the debounce window become undo steps.
    Edit,
    Undo,
    Redo,
    Show,
}

#[derive(Debug, Subcommand)]
enum HistoryCommand {
    List {
        #[arg(long)]
        json: bool,
    },
    Undo,
    Redo,
    Delete {
        id: String,
    },
    Export {
        id: String,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum ProfileCommand {
    Show,
    Connect { email: String },
    Logout,
}

#[derive(Debug, Subcommand)]
enum PlanCommand {
    Show,
    Set { plan: PlanTier },
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("imagix error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("imagix=info,imagix_engine=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = EngineConfig::from_env()?;
    let mut studio = Studio::open(&cli.state, &config)?;
    match cli.command {
        Command::Enhance(args) => run_enhance(&mut studio, args),
        Command::Generate(args) => run_generate(&mut studio, args),
        Command::Edit(args) => run_edit(&mut studio, args),
        Command::Prompt(command) => run_prompt(&mut studio, command),
        Command::History(command) => run_history(&mut studio, command),
        Command::Plan(command) => run_plan(&mut studio, command),
        Command::Profile(command) => run_profile(&mut studio, command),
    }
}

fn run_enhance(studio: &mut Studio, args: EnhanceArgs) -> Result<i32> {
    let request = EnhanceRequest {
        idea: args.idea,
        references: load_references(&args.references)?,
        style: args.style,
        camera: camera_descriptor(args.angle.as_deref(), args.lens.as_deref()),
        assisted: args.assisted,
    };
    let text = studio.enhance(&request)?;
    println!("{text}");
    Ok(0)
}

fn run_generate(studio: &mut Studio, args: GenerateArgs) -> Result<i32> {
    if args.count == 0 {
        bail!("--count must be at least 1");
    }
    let (urls, paths): (Vec<String>, Vec<String>) = args
        .references
        .into_iter()
        .partition(|reference| reference.starts_with("data:"));
    let paths: Vec<PathBuf> = paths.into_iter().map(PathBuf::from).collect();
    let options = GenerateOptions {
        prompt: args.prompt,
        references: load_references(&paths)?,
        reference_urls: urls,
        style: args.style,
        camera: camera_descriptor(args.angle.as_deref(), args.lens.as_deref()),
        aspect_ratio: args.aspect,
        resolution: args.resolution,
        use_web_grounding: args.search,
        count: args.count,
        variation: args.variation,
    };
    let items = studio.generate(&options)?;
    for item in &items {
        report_item(item, args.out.as_deref())?;
    }
    if let Some(remaining) = studio.session().remaining_free() {
        println!("Free generations left: {remaining}");
    }
    Ok(0)
}

fn run_edit(studio: &mut Studio, args: EditArgs) -> Result<i32> {
    let mask = load_image_file(&args.mask)?;
    let item = studio.magic_edit(mask, &args.prompt, args.style)?;
    report_item(&item, args.out.as_deref())?;
    Ok(0)
}

fn run_prompt(studio: &mut Studio, command: PromptCommand) -> Result<i32> {
    let text = match command {
        PromptCommand::Set { text } => {
            if !studio.set_prompt(&text)? {
                println!("(unchanged)");
            }
            Some(text)
        }
        PromptCommand::Edit => {
            for line in std::io::stdin().lock().lines() {
                let line = line?;
                studio.poll_prompt(Instant::now())?;
                studio.type_prompt(&line, Instant::now());
            }
            studio.flush_prompt()?;
            studio.current_prompt().map(str::to_string)
        }
        PromptCommand::Undo => studio.undo_prompt()?,
        PromptCommand::Redo => studio.redo_prompt()?,
        PromptCommand::Show => studio.current_prompt().map(str::to_string),
    };
    match text {
        Some(text) => println!("{text}"),
        None => println!("(nothing to show)"),
    }
    let history = studio.prompt_history();
    println!(
        "[{}/{}] undo:{} redo:{}",
        if history.is_empty() { 0 } else { history.cursor() + 1 },
        history.len(),
        history.can_undo(),
        history.can_redo()
    );
    Ok(0)
}

fn run_history(studio: &mut Studio, command: HistoryCommand) -> Result<i32> {
    match command {
        HistoryCommand::List { json } => {
            let displayed = studio.displayed_url().map(str::to_string);
            if json {
                let listing: Vec<_> = studio
                    .history()
                    .items
                    .iter()
                    .map(|item| {
                        json!({
                            "id": item.id,
                            "prompt": item.prompt,
                            "timestamp": item.timestamp,
                            "displayed": displayed.as_deref() == Some(item.url.as_str()),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&listing)?);
                return Ok(0);
            }
            if studio.history().is_empty() {
                println!("No generations yet.");
            }
            for item in &studio.history().items {
                let marker = if displayed.as_deref() == Some(item.url.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {}  {}", item.id, item.prompt);
            }
            Ok(0)
        }
        HistoryCommand::Undo => report_navigation(studio.undo_generation()?, "older"),
        HistoryCommand::Redo => report_navigation(studio.redo_generation()?, "newer"),
        HistoryCommand::Delete { id } => match studio.delete_history(&id)? {
            Some(item) => {
                println!("Deleted {}", item.id);
                Ok(0)
            }
            None => {
                eprintln!("No history entry with id '{id}'.");
                Ok(1)
            }
        },
        HistoryCommand::Export { id, out } => {
            let path = studio.export(&id, &out)?;
            println!("Exported to {}", path.display());
            Ok(0)
        }
    }
}

fn run_plan(studio: &mut Studio, command: PlanCommand) -> Result<i32> {
    if let PlanCommand::Set { plan } = command {
        studio.set_plan(plan)?;
    }
    let session = studio.session();
    println!("Plan: {}", session.plan);
    println!("Generations used: {}", session.usage_count);
    if let Some(remaining) = session.remaining_free() {
        println!("Free generations left: {remaining}");
    }
    if let Some(days) = studio.days_left() {
        println!("Days left: {days}");
    }
    Ok(0)
}

fn run_profile(studio: &mut Studio, command: ProfileCommand) -> Result<i32> {
    match command {
        ProfileCommand::Show => {}
        ProfileCommand::Connect { email } => studio.connect_profile(&email)?,
        ProfileCommand::Logout => studio.logout()?,
    }
    let session = studio.session();
    if session.is_signed_in() {
        println!("{} <{}>", session.profile.name, session.profile.email);
    } else {
        println!("Not signed in.");
    }
    Ok(0)
}

fn report_navigation(item: Option<HistoryItem>, direction: &str) -> Result<i32> {
    match item {
        Some(item) => {
            println!("Showing {}  {}", item.id, item.prompt);
            Ok(0)
        }
        None => {
            println!("No {direction} generation.");
            Ok(1)
        }
    }
}

fn report_item(item: &HistoryItem, out: Option<&Path>) -> Result<()> {
    match out {
        Some(dir) => {
            let path = write_data_url(&item.url, dir, &format!("imagix-{}", item.id))?;
            println!("{}  {}", item.id, path.display());
        }
        None => println!("{}  {}", item.id, item.prompt),
    }
    Ok(())
}

fn load_references(paths: &[PathBuf]) -> Result<Vec<imagix_contracts::encoding::EncodedImage>> {
    paths.iter().map(|path| load_image_file(path)).collect()
}
