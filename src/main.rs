fn main() {
    if let Err(err) = agentctl::cli::run() {
        agentctl::ui::eprintln_error(&err);
        std::process::exit(agentctl::exit::exit_code(&err));
    }
}
