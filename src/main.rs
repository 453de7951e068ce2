use clap::Parser;
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error};

mod annotate;
mod chunks;
mod config;
mod helpers;
mod openaiapi;
mod splice;
mod telemetry;

#[cfg(test)]
mod test;

use annotate::{Action, Job, UpdateBudget};
use config::Config;
use openaiapi::{ChatClient, NoProgress, ProgressSink, StdoutEcho};

const ACTION_QUESTION: &str = "Would you like to improve existing comments or add new comments? (improve/add) ";
const INSTRUCTIONS_QUESTION: &str = "Are there any additional prompts? ";

#[derive(Parser)]
#[command(name = "commentfill", about = "Fill <comment here> tags in source files with model-written comments")]
struct Cli {
	/// Source files to rewrite in place
	#[arg(required = true)]
	files: Vec<PathBuf>,
	#[arg(long)]
	/// add or improve (asked interactively when omitted)
	action: Option<String>,
	#[arg(long)]
	/// additional instructions for the model (asked interactively when omitted)
	instructions: Option<String>,
	#[arg(long)]
	/// tag to replace, default "<comment here>"
	placeholder: Option<String>,
	#[arg(long)]
	model: Option<String>,
	#[arg(long)]
	/// maximum number of generated replacements per file
	max_updates: Option<usize>,
	#[arg(long)]
	/// bytes of surrounding code sent with each tag
	max_snippet: Option<usize>,
	#[arg(long)]
	/// bytes per request when improving whole files
	chunk_size: Option<usize>,
	#[arg(long)]
	/// do not echo generated text while it streams
	quiet: bool,
	#[arg(long)]
	/// print the rewritten file instead of saving it
	dry_run: bool,
	#[arg(short, long)]
	verbose: bool,
}

/// How a run ended, before it is turned into a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunStatus {
	Completed { failures: usize },
	InvalidAction,
}

impl RunStatus {
	fn exit_code(self) -> ExitCode {
		match self {
			RunStatus::Completed { failures: 0 } => ExitCode::SUCCESS,
			_ => ExitCode::FAILURE,
		}
	}
}

#[tokio::main]
async fn main() -> ExitCode {
	let args = Cli::parse();

	let default_filter = if args.verbose { "debug" } else { "info" };
	if let Err(err) = telemetry::initialise(default_filter) {
		eprintln!("{}", err);
	}

	match run(args).await {
		Ok(status) => status.exit_code(),
		Err(err) => {
			error!("{}", err);
			ExitCode::FAILURE
		},
	}
}

async fn run(args: Cli) -> Result<RunStatus, Box<dyn Error>> {
	let config = Config::from_env()?;
	let stdin = io::stdin();
	run_with(args, config, &mut stdin.lock(), &mut io::stdout()).await
}

async fn run_with<R: BufRead, W: Write>(args: Cli, mut config: Config, input: &mut R, output: &mut W) -> Result<RunStatus, Box<dyn Error>> {
	if let Some(model) = args.model.as_deref() {
		config.set_model_name(model);
	}
	if let Some(placeholder) = args.placeholder.as_deref() {
		config.set_placeholder(placeholder)?;
	}
	if args.max_updates.is_some() {
		config.max_updates = args.max_updates;
	}
	if let Some(max_snippet) = args.max_snippet {
		config.max_snippet = max_snippet;
	}
	if let Some(chunk_size) = args.chunk_size {
		config.chunk_size = chunk_size.max(1);
	}
	debug!(endpoint = %config.endpoint, model = %config.model, "configuration loaded");

	let answer = match args.action {
		Some(action) => action,
		None => {
			let answer = helpers::ask(input, output, ACTION_QUESTION)?;
			writeln!(output, "{}", answer)?;
			answer
		},
	};
	let Some(action) = Action::parse(&answer) else {
		error!(answer = %answer, "expected improve or add");
		return Ok(RunStatus::InvalidAction);
	};

	let instructions = match args.instructions {
		Some(instructions) => instructions,
		None => helpers::ask(input, output, INSTRUCTIONS_QUESTION)?,
	};

	let client = ChatClient::new(&config)?;
	let job = Job {
		instructions: &instructions,
		placeholder: &config.placeholder,
		budget: UpdateBudget { cap: config.max_updates, offset: config.update_offset },
		max_snippet: config.max_snippet,
		chunk_size: config.chunk_size,
	};
	let mut sink: Box<dyn ProgressSink> = if args.quiet { Box::new(NoProgress) } else { Box::new(StdoutEcho) };

	let mut failures = 0;
	for path in &args.files {
		writeln!(output, "Considering {}", path.display())?;
		match annotate::process_file(&client, path, action, &job, args.dry_run, sink.as_mut()).await {
			Ok(outcome) => {
				if args.dry_run {
					write!(output, "{}", outcome.document)?;
				}
				writeln!(output, "DONE {}", path.display())?;
			},
			Err(err) => {
				error!(path = %path.display(), "{}", err);
				failures += 1;
			},
		}
	}

	Ok(RunStatus::Completed { failures })
}
