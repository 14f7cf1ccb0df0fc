fn main() {
    if let Err(err) = censo_rank::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
