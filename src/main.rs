use anyhow::{anyhow, Context, Result};
use bat::PrettyPrinter;
use clap::{Parser, Subcommand};
use cliclack::{input, intro, log, outro, spinner};
use console::style;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use lakechat::client::WorkspaceClient;
use lakechat::configs::base::FromEnv;
use lakechat::configs::{Credential, Settings};
use lakechat::extract::{extract_text, truncate_context};
use lakechat::jobs::{JobTrigger, RunId};
use lakechat::providers::serving::ServingEndpointProvider;
use lakechat::session::ChatSession;
use lakechat::upload::{FileKind, UploadBackend, UploadFile, Uploader};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML settings file; LAKECHAT_<SECTION>__<KEY> variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Chat with the serving endpoint (default)
    Chat {
        /// Document whose text is offered to the model as context. Repeatable;
        /// the session holds one attachment, so the last file wins
        #[arg(short, long)]
        attach: Vec<PathBuf>,
    },
    /// Upload pdf, txt, docx or xlsx files to workspace storage
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Destination directory (defaults to upload.root)
        #[arg(long)]
        root: Option<String>,

        #[arg(long, value_enum)]
        backend: Option<CliUploadBackend>,

        /// Fail instead of replacing existing files
        #[arg(long)]
        no_overwrite: bool,

        /// Start jobs.job_id for every uploaded file
        #[arg(long)]
        ingest: bool,
    },
    /// Start a job run
    Trigger {
        /// Job to run (defaults to jobs.job_id)
        #[arg(long)]
        job_id: Option<String>,

        /// Notebook parameter as key=value, repeatable
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Wait for the run and print its output
        #[arg(long)]
        wait: bool,
    },
    /// Print the notebook output of a run
    Output { run_id: String },
    /// Print the text the chat would see for a document
    Extract {
        file: PathBuf,

        /// Maximum characters (defaults to serving.context_chars)
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum CliUploadBackend {
    WorkspaceImport,
    DbfsPut,
    FilesUpload,
    VolumesFiles,
    JobRelay,
}

impl From<CliUploadBackend> for UploadBackend {
    fn from(variant: CliUploadBackend) -> Self {
        match variant {
            CliUploadBackend::WorkspaceImport => UploadBackend::WorkspaceImport,
            CliUploadBackend::DbfsPut => UploadBackend::DbfsPut,
            CliUploadBackend::FilesUpload => UploadBackend::FilesUpload,
            CliUploadBackend::VolumesFiles => UploadBackend::VolumesFiles,
            CliUploadBackend::JobRelay => UploadBackend::JobRelay,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Chat { attach: Vec::new() });

    // Offline; needs no workspace.
    if let Command::Extract { file, limit } = &command {
        return extract(cli.config.as_deref(), file, *limit);
    }

    let settings = Settings::load(cli.config.as_deref())?;
    let credential = Credential::from_env()?;
    let client = WorkspaceClient::new(
        settings.workspace.host.clone(),
        credential,
        settings.workspace.timeout(),
    )?;

    match command {
        Command::Chat { attach } => chat(&settings, client, attach.last().map(PathBuf::as_path)),
        Command::Upload {
            files,
            root,
            backend,
            no_overwrite,
            ingest,
        } => upload(
            &settings,
            client,
            &files,
            root,
            backend.map(UploadBackend::from),
            no_overwrite,
            ingest,
        ),
        Command::Trigger {
            job_id,
            params,
            wait,
        } => trigger(&settings, client, job_id, params, wait),
        Command::Output { run_id } => {
            let jobs = JobTrigger::new(client).with_poll_policy(settings.jobs.poll_policy());
            show_output(&jobs, &RunId::new(run_id))
        }
        Command::Extract { .. } => unreachable!("handled before loading settings"),
    }
}

fn chat(settings: &Settings, client: WorkspaceClient, attach: Option<&Path>) -> Result<()> {
    let provider =
        ServingEndpointProvider::new(client, &settings.serving.endpoint, settings.serving.shape)?;
    let mut session = ChatSession::new(settings.serving.sampling()?, settings.serving.context_chars)
        .with_system_prompt(settings.serving.system_prompt.clone());

    intro(format!("lakechat {}", style(provider.endpoint()).cyan()))?;
    if let Some(path) = attach {
        attach_file(&mut session, path)?;
    }
    println!(
        "{}",
        style("- type \"exit\" to end the session, /attach PATH, /detach or /clear").dim()
    );

    loop {
        let message_text: String = input("Message:").placeholder("").multiline().interact()?;
        let message = message_text.trim();

        if message.eq_ignore_ascii_case("exit") {
            break;
        }
        if message == "/clear" {
            session.clear();
            log::info("Conversation cleared")?;
            continue;
        }
        if message == "/detach" {
            match session.detach() {
                Some(attachment) => log::info(format!("Detached {}", attachment.name))?,
                None => log::info("Nothing attached")?,
            }
            continue;
        }
        if let Some(path) = message.strip_prefix("/attach ") {
            if let Err(e) = attach_file(&mut session, Path::new(path.trim())) {
                log::error(format!("{:#}", e))?;
            }
            continue;
        }
        if message.is_empty() {
            continue;
        }

        let spin = spinner();
        spin.start("awaiting reply");
        let result = session.send(&provider, message);
        spin.stop("");

        match result {
            Ok(reply) => {
                render(&reply)?;
                println!("\n");
            }
            Err(e) => log::error(e.to_string())?,
        }
    }

    outro(format!("Closed {}", session.id()))?;
    Ok(())
}

fn attach_file(session: &mut ChatSession, path: &Path) -> Result<()> {
    let name = file_name(path)?;
    let kind = FileKind::from_name(&name)?;
    if !kind.is_inspectable() {
        return Err(anyhow!("{} cannot be read as text, only pdf and txt can", name));
    }

    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let chars = session.attach(&name, &bytes).chars().count();
    log::success(format!("Attached {} ({} characters)", name, chars))?;
    Ok(())
}

fn upload(
    settings: &Settings,
    client: WorkspaceClient,
    files: &[PathBuf],
    root: Option<String>,
    backend: Option<UploadBackend>,
    no_overwrite: bool,
    ingest: bool,
) -> Result<()> {
    let root = root.unwrap_or_else(|| settings.upload.root.clone());
    let overwrite = settings.upload.overwrite && !no_overwrite;
    let ingest_job = if ingest {
        Some(
            settings
                .jobs
                .job_id
                .clone()
                .context("--ingest needs jobs.job_id to be set")?,
        )
    } else {
        None
    };

    let mut uploader = Uploader::new(client.clone(), backend.unwrap_or(settings.upload.backend));
    if let Some(job_id) = &settings.jobs.relay_job_id {
        uploader = uploader.with_relay_job(job_id.clone());
    }
    let jobs = JobTrigger::new(client);

    let mut failures = 0;
    let mut batch = Vec::new();
    for path in files {
        match file_name(path).and_then(|name| {
            let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            Ok(UploadFile { name, bytes })
        }) {
            Ok(file) => batch.push(file),
            Err(e) => {
                failures += 1;
                log::error(format!("{:#}", e))?;
            }
        }
    }

    let spin = spinner();
    spin.start(format!("uploading {} file(s) to {}", batch.len(), root));
    let results = uploader.upload_batch(&root, &batch, overwrite);
    spin.stop("");

    for (name, result) in results {
        let path = match result {
            Ok(path) => path,
            Err(e) => {
                failures += 1;
                log::error(format!("{}: {}", name, e))?;
                continue;
            }
        };
        log::success(format!("Uploaded {} to {}", name, path))?;

        if let Some(job_id) = &ingest_job {
            match jobs.trigger_ingest(job_id, &path) {
                Ok(run_id) => log::info(format!("Ingest run {} started", run_id))?,
                Err(e) => {
                    failures += 1;
                    log::error(format!("{}: {}", name, e))?;
                }
            }
        }
    }

    if failures > 0 {
        return Err(anyhow!("{} of {} file(s) failed", failures, files.len()));
    }
    Ok(())
}

fn trigger(
    settings: &Settings,
    client: WorkspaceClient,
    job_id: Option<String>,
    params: Vec<(String, String)>,
    wait: bool,
) -> Result<()> {
    let job_id = job_id
        .or_else(|| settings.jobs.job_id.clone())
        .context("no job to run: pass --job-id or set jobs.job_id")?;
    let params: BTreeMap<String, String> = params.into_iter().collect();

    let jobs = JobTrigger::new(client).with_poll_policy(settings.jobs.poll_policy());
    let run_id = jobs.trigger(&job_id, &params)?;
    log::success(format!("Started run {} of job {}", run_id, job_id))?;

    if wait {
        show_output(&jobs, &run_id)?;
    }
    Ok(())
}

fn show_output(jobs: &JobTrigger, run_id: &RunId) -> Result<()> {
    let spin = spinner();
    spin.start(format!("waiting for run {}", run_id));
    let output = jobs.fetch_output(run_id);
    spin.stop("");

    let output = output?;
    if output.is_empty() {
        log::info(format!("Run {} has no output yet", run_id))?;
    } else {
        render(&output)?;
    }
    Ok(())
}

fn extract(config: Option<&Path>, file: &Path, limit: Option<usize>) -> Result<()> {
    let limit = match limit {
        Some(limit) => limit,
        None => Settings::layered(config)?.serving.context_chars,
    };
    let bytes = fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    println!("{}", truncate_context(&extract_text(&bytes), limit));
    Ok(())
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no usable file name", path.display()))
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

fn render(content: &str) -> Result<()> {
    PrettyPrinter::new()
        .input_from_bytes(content.as_bytes())
        .language("markdown")
        .print()
        .map_err(|e| anyhow!("rendering reply: {}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_is_default_and_attach_repeats() {
        let cli = Cli::try_parse_from(["lakechat"]).unwrap();
        assert!(cli.command.is_none());

        let cli =
            Cli::try_parse_from(["lakechat", "chat", "--attach", "a.pdf", "-a", "b.txt"]).unwrap();
        match cli.command {
            Some(Command::Chat { attach }) => {
                assert_eq!(attach, vec![PathBuf::from("a.pdf"), PathBuf::from("b.txt")]);
                assert_eq!(attach.last().map(PathBuf::as_path), Some(Path::new("b.txt")));
            }
            _ => panic!("Expected chat command"),
        }
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("file_path=/Volumes/a=b.pdf").unwrap(),
            ("file_path".to_string(), "/Volumes/a=b.pdf".to_string())
        );
        assert!(parse_param("no-separator").is_err());
        assert!(parse_param(" =value").is_err());
    }
}
