mod output;

use lang::tokenizer::tokenize;
use lang::{CalcError, Evaluator};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::env;
use std::io::Read;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut repl_mode = false;
    let mut json_mode = false;
    let mut eval_script: Option<String> = None;
    let mut input_radix: u32 = 10;
    let mut precision: usize = 12;
    let mut terms: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                process::exit(0);
            }
            "-r" | "--repl" => {
                repl_mode = true;
            }
            "-j" | "--json" => {
                json_mode = true;
            }
            "-e" | "--eval" => {
                i += 1;
                if i < args.len() {
                    eval_script = Some(args[i].clone());
                } else {
                    eprintln!("Error: -e requires an expression argument");
                    process::exit(1);
                }
            }
            "-i" | "--input-radix" => {
                i += 1;
                match args.get(i).and_then(|arg| arg.parse::<u32>().ok()) {
                    Some(radix) if (2..=36).contains(&radix) => input_radix = radix,
                    _ => {
                        eprintln!("Error: -i requires a radix between 2 and 36");
                        process::exit(1);
                    }
                }
            }
            "-p" | "--precision" => {
                i += 1;
                match args.get(i).and_then(|arg| arg.parse::<usize>().ok()) {
                    Some(digits) => precision = digits,
                    None => {
                        eprintln!("Error: -p requires a digit count");
                        process::exit(1);
                    }
                }
            }
            // anything else is a term; '-5' and '-' are valid terms, so
            // only the flags above are reserved
            term => terms.push(term.to_string()),
        }
        i += 1;
    }

    let mut evaluator = Evaluator::new();
    evaluator.set_input_radix(input_radix);
    evaluator.set_precision(precision);

    if repl_mode {
        match run_repl(&mut evaluator, json_mode) {
            Ok(()) => process::exit(0),
            Err(ExitCode::ArgumentError) => process::exit(1),
            Err(ExitCode::EvalError) => process::exit(2),
        }
    }

    // Term sources combine: argv terms, then an -e expression; stdin is
    // read only when neither supplied anything
    if let Some(script) = eval_script {
        match tokenize(&script) {
            Ok(tokens) => terms.extend(tokens),
            Err(err) => {
                eprintln!("rpn-cli: {}", err.message);
                process::exit(1);
            }
        }
    }

    if terms.is_empty() && !atty::is(atty::Stream::Stdin) {
        let mut source = String::new();
        if let Err(err) = std::io::stdin().read_to_string(&mut source) {
            eprintln!("Error reading from stdin: {err}");
            process::exit(1);
        }
        match tokenize(&source) {
            Ok(tokens) => terms.extend(tokens),
            Err(err) => {
                eprintln!("rpn-cli: {}", err.message);
                process::exit(1);
            }
        }
    }

    if terms.is_empty() {
        print_help();
        process::exit(1);
    }

    match evaluate_and_print(&mut evaluator, &terms, json_mode) {
        Ok(()) => process::exit(0),
        Err(ExitCode::ArgumentError) => process::exit(1),
        Err(ExitCode::EvalError) => process::exit(2),
    }
}

enum ExitCode {
    ArgumentError,
    EvalError,
}

fn print_help() {
    println!("rpn command-line calculator");
    println!();
    println!("USAGE:");
    println!("    rpn-cli <TERMS>...        Evaluate postfix terms, e.g. rpn-cli 2 3 add");
    println!("    rpn-cli -e <EXPR>         Evaluate a quoted expression");
    println!("    rpn-cli -r                Start an interactive session");
    println!("    rpn-cli -h                Show this help");
    println!("    echo '2 3 add' | rpn-cli  Read terms from stdin");
    println!();
    println!("OPTIONS:");
    println!("    -e, --eval <EXPR>         Evaluate a quoted expression");
    println!("    -i, --input-radix <N>     Interpret numeric input in base N (2-36)");
    println!("    -p, --precision <N>       Display decimals with N digits");
    println!("    -j, --json                Emit results as JSON");
    println!("    -r, --repl                Start an interactive session");
}

fn evaluate_and_print(
    evaluator: &mut Evaluator,
    terms: &[String],
    json_mode: bool,
) -> Result<(), ExitCode> {
    match evaluator.evaluate_terms(terms) {
        Ok(values) => {
            let precision = evaluator.precision();
            let rendered = if json_mode {
                output::format_results_json(&values, precision)
            } else {
                output::format_results_text(&values, precision)
            };
            match rendered {
                Ok(line) => {
                    if !line.is_empty() {
                        println!("{line}");
                    }
                    Ok(())
                }
                Err(err) => {
                    report_error(&CalcError::Eval(err), json_mode);
                    Err(ExitCode::EvalError)
                }
            }
        }
        Err(err) => {
            report_error(&err, json_mode);
            Err(ExitCode::EvalError)
        }
    }
}

fn report_error(err: &CalcError, json_mode: bool) {
    if json_mode {
        println!("{}", output::format_error_json(err));
    } else {
        eprintln!("rpn-cli: {err}");
    }
}

/// Interactive loop. One evaluator lives for the whole session, so
/// variables and named functions persist between lines.
fn run_repl(evaluator: &mut Evaluator, json_mode: bool) -> Result<(), ExitCode> {
    println!("rpn calculator (ctrl-d to exit)");

    let mut editor = DefaultEditor::new().map_err(|err| {
        eprintln!("Failed to initialize the interactive session: {err}");
        ExitCode::EvalError
    })?;

    loop {
        match editor.readline("rpn> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }

                editor.add_history_entry(&line).ok();

                match tokenize(&line) {
                    Ok(terms) => {
                        // errors end the line, not the session
                        let _ = evaluate_and_print(evaluator, &terms, json_mode);
                    }
                    Err(err) => eprintln!("rpn-cli: {}", err.message),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                break;
            }
            Err(err) => {
                eprintln!("Error: {err}");
                return Err(ExitCode::EvalError);
            }
        }
    }

    Ok(())
}
