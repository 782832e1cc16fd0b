use std::fs;
use std::process;

use clap::Parser as _;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use ruler::engine::{Context, EvalError};
use ruler::form::{Form, ParseError};
use ruler::lexer::{Lexer, Loc, TokenKind};

#[derive(Debug)]
enum Error {
    Parse(ParseError),
    Eval(EvalError),
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

impl From<EvalError> for Error {
    fn from(err: EvalError) -> Self {
        Self::Eval(err)
    }
}

fn report_at(loc: &Loc, message: &str) {
    match loc {
        Loc::File { path, row, col } => {
            eprintln!("{}:{}:{}: ERROR: {}", path, row, col, message);
        }
        Loc::Repl { col, line } => {
            eprintln!("{}", line.iter().collect::<String>());
            eprintln!("{:>width$}^", "", width = col - 1);
            eprintln!("ERROR: {}", message);
        }
    }
}

fn report_error(err: &Error) {
    match err {
        Error::Parse(err) => report_at(err.loc(), &err.to_string()),
        Error::Eval(err) => eprintln!("ERROR: {}", err),
    }
}

/// Evaluates one form and prints the rule count after a definition, the
/// resulting form, and the match count.
fn eval_and_print(context: &mut Context, form: Form) -> Result<(), Error> {
    let rules_before = context.rules().len();
    let (result, matches) = context.eval(form)?;
    if context.rules().len() > rules_before {
        if let Some(rule) = context.rules().iter().last() {
            println!("there are {} rules after adding {}", context.rules().len(), rule);
        }
    }
    println!("{}", result);
    println!("that took {} matches", matches);
    Ok(())
}

fn interpret_file(context: &mut Context, file_path: &str) {
    let source = match fs::read_to_string(file_path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("ERROR: could not load file {}: {}", file_path, err);
            process::exit(1)
        }
    };
    let mut lexer = Lexer::new(source.chars().collect(), Some(file_path.to_string()));
    while lexer.peek_token().kind != TokenKind::End {
        let result = Form::parse(&mut lexer)
            .map_err(Error::from)
            .and_then(|form| eval_and_print(context, form));
        if let Err(err) = result {
            report_error(&err);
            process::exit(1)
        }
    }
}

fn eval_line(context: &mut Context, line: &str) -> Result<(), Error> {
    let mut lexer = Lexer::new(line.chars().collect(), None);
    if lexer.peek_token().kind == TokenKind::End {
        // Blank or comment-only input carries no form. Skip it silently.
        return Ok(());
    }
    let form = Form::parse(&mut lexer)?;
    lexer
        .expect_token(TokenKind::End)
        .map_err(|(expected, actual)| ParseError::ExpectedToken { expected, actual })?;
    eval_and_print(context, form)
}

fn start_repl(context: &mut Context) {
    let prompt = "ruler> ";
    let mut editor = DefaultEditor::new().expect("could not initialize the line editor");
    loop {
        match editor.readline(prompt) {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                if let Err(err) = eval_line(context, &line) {
                    report_error(&err);
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("ERROR: {}", err);
                break;
            }
        }
    }
}

fn start_lexer_debugger() {
    let prompt = "lexer> ";
    let mut editor = DefaultEditor::new().expect("could not initialize the line editor");
    while let Ok(line) = editor.readline(prompt) {
        let _ = editor.add_history_entry(line.as_str());
        let tokens = Lexer::new(line.chars().collect(), None)
            .map(|token| (token.kind, token.text))
            .collect::<Vec<_>>();
        println!("Tokens: {:?}", tokens);
    }
}

fn start_parser_debugger() {
    let prompt = "parser> ";
    let mut editor = DefaultEditor::new().expect("could not initialize the line editor");
    while let Ok(line) = editor.readline(prompt) {
        let _ = editor.add_history_entry(line.as_str());
        let mut lexer = Lexer::new(line.chars().collect(), None);
        if lexer.peek_token().kind == TokenKind::End {
            continue;
        }
        match Form::parse(&mut lexer) {
            Err(err) => report_error(&err.into()),
            Ok(form) => {
                println!("  Display:  {}", form);
                println!("  Debug:    {:?}", form);
                println!("  Unparsed: {:?}", lexer.map(|t| (t.kind, t.text)).collect::<Vec<_>>());
            }
        }
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum DebugMode {
    Lexer,
    Parser,
}

#[derive(clap::Parser, Debug)]
#[command(version, about = "Rule over formal systems using lisp syntax")]
struct Config {
    /// Script to interpret instead of starting the interactive shell
    file: Option<String>,

    /// Give up on an evaluation after this many rule firings
    #[arg(long)]
    max_rewrites: Option<usize>,

    /// Start one of the debugging shells instead of the normal one
    #[arg(long, value_enum)]
    debug: Option<DebugMode>,
}

fn main() {
    env_logger::init();
    let config = Config::parse();

    let mut context = Context::new();
    if let Some(limit) = config.max_rewrites {
        context.set_max_rewrites(limit);
    }

    if let Some(file_path) = &config.file {
        interpret_file(&mut context, file_path)
    } else {
        match config.debug {
            Some(DebugMode::Lexer) => start_lexer_debugger(),
            Some(DebugMode::Parser) => start_parser_debugger(),
            None => start_repl(&mut context),
        }
    }
}
