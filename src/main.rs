fn main() {
    if let Err(err) = hfstage::run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
