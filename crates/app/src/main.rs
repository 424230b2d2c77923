use std::fmt;
use std::sync::Arc;

use backend::{Backend, HttpConfig};
use quiz_core::model::{AttemptId, QuizFilter, QuizId, Skill, format_remaining};
use services::{
    Clock, QuizCatalogService, QuizSessionController, ResultsService, ResultsView, TickerMode,
};
use tracing::info;

mod take;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArgument { what: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidSkill { raw: String },
    InvalidPart { raw: String },
    InvalidId { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArgument { what } => write!(f, "missing {what}"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidSkill { raw } => write!(f, "invalid --skill value: {raw}"),
            ArgsError::InvalidPart { raw } => write!(f, "invalid --part value: {raw}"),
            ArgsError::InvalidId { raw } => write!(f, "invalid id: {raw:?}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  quiz list   [--skill <skill>] [--part <n>]");
    eprintln!("  quiz take   <quiz-id>");
    eprintln!("  quiz result <attempt-id>");
    eprintln!();
    eprintln!("Global options:");
    eprintln!("  --api <url>      backend base URL (default {})", backend::http::DEFAULT_API_URL);
    eprintln!("  --token <token>  bearer token for the signed-in user");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_API_URL, QUIZ_API_TOKEN, QUIZ_LOG (or RUST_LOG)");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    List(QuizFilter),
    Take(QuizId),
    Result(AttemptId),
}

#[derive(Debug)]
struct Args {
    command: Command,
    api_url: Option<String>,
    token: Option<String>,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, ArgsError> {
        let mut args = args.into_iter();
        let mut api_url = None;
        let mut token = None;
        let mut positional = Vec::new();
        let mut filter = QuizFilter::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--api" => api_url = Some(require_value(&mut args, "--api")?),
                "--token" => token = Some(require_value(&mut args, "--token")?),
                "--skill" => {
                    let value = require_value(&mut args, "--skill")?;
                    let skill: Skill = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidSkill { raw: value.clone() })?;
                    filter.skill = Some(skill);
                }
                "--part" => {
                    let value = require_value(&mut args, "--part")?;
                    let part: u32 = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidPart { raw: value.clone() })?;
                    filter.part = Some(part);
                }
                _ if arg.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        let command = match positional.next().as_deref() {
            Some("list") => Command::List(filter),
            Some("take") => {
                let raw = positional
                    .next()
                    .ok_or(ArgsError::MissingArgument { what: "quiz id" })?;
                Command::Take(raw.parse().map_err(|_| ArgsError::InvalidId { raw })?)
            }
            Some("result") => {
                let raw = positional
                    .next()
                    .ok_or(ArgsError::MissingArgument { what: "attempt id" })?;
                Command::Result(raw.parse().map_err(|_| ArgsError::InvalidId { raw })?)
            }
            Some(other) => return Err(ArgsError::UnknownCommand(other.to_owned())),
            None => return Err(ArgsError::MissingArgument { what: "subcommand" }),
        };
        if let Some(extra) = positional.next() {
            return Err(ArgsError::UnknownArg(extra));
        }

        Ok(Self {
            command,
            api_url,
            token,
        })
    }

    fn http_config(&self) -> HttpConfig {
        let mut config = HttpConfig::from_env();
        if let Some(url) = &self.api_url {
            config.base_url.clone_from(url);
        }
        match &self.token {
            Some(token) => config.with_token(token.clone()),
            None => config,
        }
    }
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_env("QUIZ_LOG"))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_results(view: &ResultsView) {
    println!("{}  (attempt {})", view.quiz.title(), view.result.attempt_id);
    println!(
        "Score: {:.0}%  {}  ({} of {} correct, {} spent)",
        view.result.score,
        view.band().label(),
        view.correct_count(),
        view.rows.len(),
        format_remaining(view.result.time_spent_secs)
    );
    println!();
    for row in &view.rows {
        let mark = match row.is_correct {
            Some(true) => "ok",
            Some(false) => "xx",
            None => "--",
        };
        let given = if row.given_answer.is_empty() {
            "(no answer)"
        } else {
            row.given_answer.as_str()
        };
        println!("{mark} {:>2}. {}", row.number, row.prompt);
        println!("      your answer: {given}");
        if let Some(correct) = &row.correct_answer {
            println!("      correct:     {correct}");
        }
        if let Some(explanation) = &row.explanation {
            println!("      {explanation}");
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if argv.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_usage();
        return Ok(());
    }

    let args = Args::parse(argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    setup_logging();
    let backend = Backend::http(args.http_config())?;

    match args.command {
        Command::List(filter) => {
            let catalog = QuizCatalogService::new(Arc::clone(&backend.content));
            let quizzes = catalog.list(filter).await?;
            if quizzes.is_empty() {
                println!("No quizzes found.");
            }
            for quiz in quizzes {
                let limit = quiz
                    .time_limit_minutes
                    .map_or_else(|| "untimed".to_owned(), |m| format!("{m} min"));
                println!(
                    "{:<24} {:<10} part {:<2} {:>3} questions  {:<8} {}",
                    quiz.id.as_str(),
                    quiz.skill.as_str(),
                    quiz.part,
                    quiz.question_count,
                    limit,
                    quiz.title
                );
            }
        }
        Command::Take(quiz_id) => {
            let access = backend.access.current_user().await?;
            if let Some(left) = access.remaining_attempts() {
                println!("Free attempts left: {left}");
            }
            let session = QuizSessionController::new(
                Arc::clone(&backend.content),
                Clock::system(),
                TickerMode::every_second(),
            );
            session.start(&quiz_id, &access).await?;

            if let Some(result) = take::run(Arc::clone(&session)).await? {
                info!(attempt = %result.attempt_id, "attempt finished");
                let view = ResultsService::new(backend.content)
                    .load(&result.attempt_id)
                    .await?;
                println!();
                print_results(&view);
            }
        }
        Command::Result(attempt_id) => {
            let view = ResultsService::new(backend.content)
                .load(&attempt_id)
                .await?;
            print_results(&view);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
