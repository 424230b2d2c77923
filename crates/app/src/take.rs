//! Interactive quiz-taking loop on stdin/stdout.

use std::error::Error;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use quiz_core::model::{AttemptResult, QuestionKind, format_remaining};
use services::{QuizSessionController, SessionPhase, SessionProgress, SubmitOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TakeCommand {
    Next,
    Previous,
    /// 1-based question number.
    Goto(usize),
    Answer(String),
    Save,
    Submit,
    Quit,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ParseCommandError {
    Empty,
    Unknown(String),
    MissingArgument(&'static str),
    InvalidNumber(String),
}

impl std::fmt::Display for ParseCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseCommandError::Empty => write!(f, "type a command, `h` for help"),
            ParseCommandError::Unknown(cmd) => write!(f, "unknown command: {cmd}"),
            ParseCommandError::MissingArgument(cmd) => write!(f, "`{cmd}` needs an argument"),
            ParseCommandError::InvalidNumber(raw) => write!(f, "not a question number: {raw}"),
        }
    }
}

impl FromStr for TakeCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(word, rest)| (word, rest.trim()));

        match word {
            "" => Err(ParseCommandError::Empty),
            "n" | "next" => Ok(Self::Next),
            "p" | "prev" => Ok(Self::Previous),
            "g" | "go" => {
                if rest.is_empty() {
                    return Err(ParseCommandError::MissingArgument("g"));
                }
                match rest.parse::<usize>() {
                    Ok(number) if number > 0 => Ok(Self::Goto(number)),
                    _ => Err(ParseCommandError::InvalidNumber(rest.to_owned())),
                }
            }
            // an empty answer clears the slot
            "a" | "answer" => Ok(Self::Answer(rest.to_owned())),
            "s" | "save" => Ok(Self::Save),
            "submit" => Ok(Self::Submit),
            "q" | "quit" => Ok(Self::Quit),
            "h" | "help" | "?" => Ok(Self::Help),
            other => Err(ParseCommandError::Unknown(other.to_owned())),
        }
    }
}

enum Flow {
    Continue,
    Finished(AttemptResult),
    Quit,
}

fn print_help() {
    println!("  n / p       next / previous question");
    println!("  g <k>       go to question k");
    println!("  a <text>    answer the current question (a letter picks a choice)");
    println!("  s           save progress");
    println!("  submit      submit the attempt");
    println!("  q           quit without submitting");
}

/// One-line progress map, e.g. `[2/5] 9:58 left  1* [2] 3 4* 5`.
pub(crate) fn render_progress(progress: &SessionProgress) -> String {
    let mut line = format!("[{}/{}]", progress.current + 1, progress.total);
    if let Some(secs) = progress.remaining_secs {
        line.push_str(&format!(" {} left", format_remaining(secs)));
    }
    line.push(' ');
    for (index, answered) in progress.answered_flags.iter().enumerate() {
        let mark = if *answered { "*" } else { "" };
        if index == progress.current {
            line.push_str(&format!(" [{}{mark}]", index + 1));
        } else {
            line.push_str(&format!(" {}{mark}", index + 1));
        }
    }
    line
}

/// `A`..`Z` for the first 26 choices, 1-based numbers after that.
fn choice_label(index: usize) -> String {
    u8::try_from(index)
        .ok()
        .filter(|offset| *offset < 26)
        .map_or_else(|| (index + 1).to_string(), |offset| char::from(b'A' + offset).to_string())
}

fn show_question(session: &QuizSessionController) {
    let Some(question) = session.current_question() else {
        return;
    };
    if let Some(progress) = session.progress() {
        println!();
        println!("{}", render_progress(&progress));
    }
    println!("{}", question.prompt());
    for (index, choice) in question.choices().iter().enumerate() {
        println!("  {}. {choice}", choice_label(index));
    }
    if let Some(audio) = question.audio() {
        println!("  audio: {audio}");
    }
    if let Some(image) = question.image() {
        println!("  image: {image}");
    }
    match session.current_answer().as_deref() {
        Some("") | None => {}
        Some(answer) => println!("  current answer: {answer}"),
    }
}

/// Single-choice questions accept a choice letter in place of the choice text.
fn resolve_answer(session: &QuizSessionController, raw: String) -> String {
    let Some(question) = session.current_question() else {
        return raw;
    };
    let mut chars = raw.chars();
    match (question.kind(), chars.next(), chars.next()) {
        (QuestionKind::SingleChoice, Some(letter), None) => question
            .choice_by_letter(letter)
            .map_or(raw.clone(), str::to_owned),
        _ => raw,
    }
}

async fn handle(session: &QuizSessionController, command: TakeCommand) -> Flow {
    let current = session.current_index().unwrap_or(0);
    let moved = match command {
        TakeCommand::Help => {
            print_help();
            return Flow::Continue;
        }
        TakeCommand::Next => session.navigate(current + 1).map(drop),
        TakeCommand::Previous => match current.checked_sub(1) {
            Some(target) => session.navigate(target).map(drop),
            None => {
                println!("already at the first question");
                return Flow::Continue;
            }
        },
        TakeCommand::Goto(number) => session.navigate(number - 1).map(drop),
        TakeCommand::Answer(text) => {
            let answer = resolve_answer(session, text);
            session.record_answer(current, answer).map(drop)
        }
        TakeCommand::Save => {
            match session.save_progress().await {
                Ok(receipt) => println!(
                    "saved {} of {} answers",
                    receipt.answered, receipt.saved_slots
                ),
                Err(err) => eprintln!("warning: {err}"),
            }
            return Flow::Continue;
        }
        TakeCommand::Submit => {
            return match session.submit().await {
                Ok(SubmitOutcome::Completed(result)) => Flow::Finished(result),
                Ok(SubmitOutcome::AlreadySubmitting) => {
                    println!("submission already in progress");
                    Flow::Continue
                }
                Err(err) => {
                    eprintln!("warning: {err}. Your answers are kept; type `submit` to retry.");
                    Flow::Continue
                }
            };
        }
        TakeCommand::Quit => {
            session.teardown();
            return Flow::Quit;
        }
    };

    match moved {
        Ok(()) => show_question(session),
        Err(err) => eprintln!("{err}"),
    }
    Flow::Continue
}

/// Whether to print the one-minute warning; never once a submission has started.
fn low_on_time(phase: SessionPhase, remaining_secs: u32) -> bool {
    phase == SessionPhase::Active && (1..=60).contains(&remaining_secs)
}

/// Runs until the attempt is submitted (by the user or on timeout) or the user quits.
///
/// # Errors
///
/// Returns an error if stdin cannot be read.
pub(crate) async fn run(
    session: Arc<QuizSessionController>,
) -> Result<Option<AttemptResult>, Box<dyn Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut refresh = tokio::time::interval(Duration::from_secs(1));
    let mut warned = false;
    let mut timeout_reported = false;

    if let Some(quiz) = session.quiz() {
        println!("{} ({} questions)", quiz.title(), quiz.question_count());
    }
    println!("Type `h` for help.");
    show_question(&session);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    session.teardown();
                    return Ok(None);
                };
                let command = match line.parse::<TakeCommand>() {
                    Ok(command) => command,
                    Err(err) => {
                        eprintln!("{err}");
                        continue;
                    }
                };
                match handle(&session, command).await {
                    Flow::Continue => {}
                    Flow::Finished(result) => return Ok(Some(result)),
                    Flow::Quit => return Ok(None),
                }
            }
            _ = refresh.tick() => {
                if session.phase() == SessionPhase::Completed {
                    println!();
                    println!("Time is up. Your answers were submitted.");
                    return Ok(session.result());
                }
                match session.remaining_secs() {
                    Some(0) if !timeout_reported && session.phase() == SessionPhase::Active => {
                        timeout_reported = true;
                        if let Some(err) = session.last_failure() {
                            eprintln!("Time is up but submitting failed: {err}. Type `submit` to retry.");
                        }
                    }
                    Some(secs) if !warned && low_on_time(session.phase(), secs) => {
                        warned = true;
                        println!("{} left", format_remaining(secs));
                    }
                    _ => {}
                }
            }
        }
    }
}
