use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("secure_viewer=info,viewer_core=info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    if let Err(error) = secure_viewer::run(std::env::args_os()) {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}
