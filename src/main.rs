use fillword::{solve_puzzle, SolverOptions};
use std::env;
use std::fs;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let mut options = SolverOptions::default();
    let mut paths: Vec<String> = Vec::new();

    for arg in env::args().skip(1) {
        if arg == "--unique" {
            options.require_unique = true;
        } else {
            paths.push(arg);
        }
    }

    if paths.len() != 2 {
        eprintln!("usage: fillword [--unique] <puzzle-file> <words-file>");
        return ExitCode::FAILURE;
    }

    let puzzle = fs::read_to_string(&paths[0])
        .expect("Something went wrong reading the puzzle file");
    let words_text = fs::read_to_string(&paths[1])
        .expect("Something went wrong reading the words file");
    let words: Vec<&str> = words_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    match solve_puzzle(&puzzle, &words, &options) {
        Ok(result) => {
            log::info!("{:?}", result.statistics);
            println!("{}", result.grid);
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::warn!("solve failed: {err}");
            println!("Error");
            ExitCode::FAILURE
        }
    }
}
