//! Runs scripts and images in one environment.
//!
//! ```text
//! panda <script or image>...
//! ```
//!
//! The files are executed in order and share their globals. Afterwards the
//! timers they registered are driven by a one millisecond tick until none
//! remain.

use std::path::Path;
use std::process;
use std::time::Duration;

use panda_rs::driver::{execute_file, run_timers};
use panda_rs::runtime::config::EnvConfig;
use panda_rs::runtime::error::PandaError;
use panda_rs::runtime::Env;

fn main() {
    let inputs: Vec<String> = std::env::args().skip(1).collect();
    if inputs.is_empty() {
        eprintln!("usage: panda <script or image>...");
        process::exit(2);
    }

    let mut env = Env::with_builtins(EnvConfig::default());
    for input in inputs.iter() {
        match execute_file(&mut env, Path::new(input)) {
            Ok(value) => env.release(value),
            Err(e) => {
                eprintln!("{}", e);
                match &e {
                    PandaError::Exec(_) => println!("execute {} fail:{}", input, e.code()),
                    _ => println!("error:{}", e.code()),
                }
                process::exit(1);
            }
        }
    }

    if let Err(e) = run_timers(&mut env, Duration::from_millis(1)) {
        eprintln!("{}", e);
        println!("execute timers fail:{}", e.code());
        process::exit(1);
    }
}
