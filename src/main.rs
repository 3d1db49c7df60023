fn main() {
    match vmsweep::cli::run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            vmsweep::ui::eprintln_error(&err);
            std::process::exit(vmsweep::exit::exit_code(&err));
        }
    }
}
