use clap::Parser;

fn main() {
    let cli = gatehousectl::Cli::parse();
    if let Err(err) = gatehousectl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
