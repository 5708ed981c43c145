fn main() {
    if let Err(err) = form_organizer::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
