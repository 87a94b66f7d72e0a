use std::panic::{self, AssertUnwindSafe};

use vault_keepass::cli::{self, output};

fn main() {
    panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!(" at {}:{}", l.file(), l.line()))
            .unwrap_or_default();
        output::error(&format!("internal error{location}"));
    }));

    let args = std::env::args_os().map(|a| a.to_string_lossy().into_owned());
    let code = match panic::catch_unwind(AssertUnwindSafe(|| cli::run(args))) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            output::error(&e.to_string());
            e.exit_code()
        }
        Err(_) => 1,
    };

    std::process::exit(code);
}
