//! Compiles scripts to images.
//!
//! ```text
//! pandac <script>...
//! ```
//!
//! Each script is written to an image next to it, with the `pdc` suffix.
//! Prints `ok:<image>` or `fail:<code>` per script and exits non-zero when
//! any of them failed.

use std::path::Path;
use std::process;

use panda_rs::driver::compile_file;

fn main() {
    let inputs: Vec<String> = std::env::args().skip(1).collect();
    if inputs.is_empty() {
        eprintln!("usage: pandac <script>...");
        process::exit(2);
    }

    let mut failed = false;
    for input in inputs.iter() {
        match compile_file(Path::new(input)) {
            Ok(image) => println!("ok:{}", image.display()),
            Err(e) => {
                eprintln!("{}", e);
                println!("fail:{}", e.code());
                failed = true;
            }
        }
    }

    if failed {
        process::exit(1);
    }
}
