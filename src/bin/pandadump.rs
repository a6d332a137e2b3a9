//! Lists the contents of an image.
//!
//! ```text
//! pandadump <image>
//! ```

use std::io::Write;
use std::process;

use panda_rs::driver::dump_image;
use panda_rs::runtime::error::PandaError;

fn run(path: &str) -> Result<(), PandaError> {
    let bytes = std::fs::read(path)?;
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    dump_image(&bytes, &mut lock)?;
    lock.flush()?;
    Ok(())
}

fn main() {
    let path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: pandadump <image>");
            process::exit(2);
        }
    };

    if let Err(e) = run(&path) {
        eprintln!("{}", e);
        println!("error:{}", e.code());
        process::exit(1);
    }
}
