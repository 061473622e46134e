use anyhow::Context;
use encounter_docgen::{
    app,
    cli::{CliOptions, USAGE},
    config::Config,
    logging::init_tracing,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = CliOptions::from_env()?;
    if options.help {
        println!("{USAGE}");
        return Ok(());
    }
    let _ = dotenvy::dotenv();

    let config_path = options.config_path();
    let mut config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    config.apply_overrides(&options);

    let logging = init_tracing(&config.logging)?;
    tracing::info!(
        target: "pipeline",
        run_id = %logging.run_id(),
        config = %config_path.display(),
        "encounter_docgen_started"
    );

    let run = app::run(&config).await?;
    match &run.run_dir {
        Some(dir) => println!("{} ({} documents)", dir.display(), run.documents.len()),
        None => println!("encounter {}: no documents predicted", run.encounter_id),
    }
    for document in &run.documents {
        println!("  {} [{}]", document.path.display(), document.document_type);
    }
    Ok(())
}
