pub fn set(level: &str) {
    use tracing_subscriber::EnvFilter;
    let directives = format!(
        "livecast={level},libcast={level},storage={level},signal={level},opendal=warn"
    );
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new(directives)))
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(true)
        .init();
}
