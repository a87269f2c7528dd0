use std::{
	io::{self, Write},
	path::PathBuf,
};

use clap::{Parser, Subcommand};
use color_eyre::eyre;

use lore_service::{
	AgentRequest, EventKind, LoreService, RetrievalMethod, RetrieveRequest, StreamEvent,
};

#[derive(Debug, Parser)]
#[command(
	version = lore_cli::VERSION,
	rename_all = "kebab",
	styles = lore_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Answer a question. Without --stream the question is routed first and only
	/// multi-step questions reach the reasoning agent.
	Ask {
		question: String,
		/// Print reasoning events to stderr and the answer as it is generated.
		#[arg(long)]
		stream: bool,
		#[arg(long, value_name = "ID")]
		conversation_id: Option<String>,
	},
	/// Run hybrid retrieval and print the ranked passages as JSON.
	Search {
		query: String,
		#[arg(long, value_name = "N")]
		top_k: Option<u32>,
		#[arg(long, value_name = "METHOD", default_value = "hybrid", value_parser = parse_method)]
		method: RetrievalMethod,
	},
	/// List registered tools with their input schemas.
	Tools,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = lore_config::load(&args.config)?;

	lore_cli::init_tracing(&config.service.log_level);

	let service = LoreService::new(config).await?;

	match args.command {
		Command::Ask { question, stream, conversation_id } => {
			let req = AgentRequest { query: question, conversation_id };

			if stream { ask_streaming(&service, req).await } else { ask(&service, req).await }
		},
		Command::Search { query, top_k, method } => {
			let result = service.retrieve(RetrieveRequest { query, top_k, method }).await?;

			println!("{}", serde_json::to_string_pretty(&result)?);

			Ok(())
		},
		Command::Tools => {
			println!("{}", serde_json::to_string_pretty(&service.tool_catalog())?);

			Ok(())
		},
	}
}

async fn ask(service: &LoreService, req: AgentRequest) -> color_eyre::Result<()> {
	let answered = service.answer(req).await?;
	let response = answered.response;

	eprintln!("[route] {}", answered.route.as_str());

	if !response.success {
		return Err(eyre::eyre!(
			"Agent run failed: {}",
			response.error.unwrap_or_else(|| "unknown error".to_string())
		));
	}

	for step in &response.steps {
		if let Some(line) = describe_step(step.step, step.tool.as_deref(), step.success) {
			eprintln!("{line}");
		}
	}

	println!("{}", response.answer);

	Ok(())
}

async fn ask_streaming(service: &LoreService, req: AgentRequest) -> color_eyre::Result<()> {
	let mut rx = service.stream_agent(req)?;
	let mut stdout = io::stdout();

	while let Some(event) = rx.recv().await {
		match event.kind {
			EventKind::Answer => {
				write!(stdout, "{}", event.data["content"].as_str().unwrap_or_default())?;
				stdout.flush()?;
			},
			EventKind::Done => writeln!(stdout)?,
			EventKind::Error =>
				return Err(eyre::eyre!(
					"Agent run failed: {}",
					event.data["message"].as_str().unwrap_or("unknown error")
				)),
			_ =>
				if let Some(line) = render_progress(&event) {
					eprintln!("{line}");
				},
		}
	}

	Ok(())
}

fn parse_method(raw: &str) -> Result<RetrievalMethod, String> {
	RetrievalMethod::parse(raw)
		.ok_or_else(|| format!("unknown method '{raw}', expected hybrid, lexical or vector"))
}

/// Stderr line for a non-answer event.
fn render_progress(event: &StreamEvent) -> Option<String> {
	let data = &event.data;

	match event.kind {
		EventKind::Thinking => {
			if let Some(plan) = data["plan"].as_array() {
				let steps: Vec<&str> = plan.iter().filter_map(|step| step.as_str()).collect();

				return Some(format!("[plan] {}", steps.join(" | ")));
			}

			data["thought"]
				.as_str()
				.filter(|thought| !thought.is_empty())
				.map(|thought| format!("[{}] thought: {thought}", event.step))
		},
		EventKind::Action => Some(format!(
			"[{}] action: {} {}",
			event.step,
			data["tool"].as_str().unwrap_or_default(),
			data["input"]
		)),
		EventKind::Observation => describe_step(
			event.step,
			data["tool"].as_str(),
			data["success"].as_bool(),
		),
		EventKind::Reflection =>
			data["text"].as_str().map(|text| format!("[{}] reflection: {text}", event.step)),
		EventKind::Answer | EventKind::Done | EventKind::Error => None,
	}
}

fn describe_step(step: u32, tool: Option<&str>, success: Option<bool>) -> Option<String> {
	let tool = tool?;
	let outcome = if success.unwrap_or(false) { "ok" } else { "failed" };

	Some(format!("[{step}] {tool}: {outcome}"))
}
