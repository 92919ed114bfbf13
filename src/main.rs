fn main() {
    if let Err(err) = avaliacao_etl::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
