use clap::Parser;
use flyergen::config::{EnvSource, ProcessEnv};
use flyergen::logger::{self, LoggerConfig};
use flyergen::{
    AspectRatio, CancellationToken, GenerationRequest, ImageProviderFactory, ProviderType,
    QualityTier,
};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Parser)]
#[command(name = "flyergen", version, about = "Generate event flyer images")]
struct Cli {
    /// Provider to try first (ideogram, huggingface, qwen, fal-qwen, fal-ideogram).
    #[arg(short, long, value_parser = ProviderType::from_str)]
    provider: Option<ProviderType>,
    #[arg(short, long, default_value = "1:1", value_parser = AspectRatio::from_str)]
    ratio: AspectRatio,
    #[arg(short, long, value_parser = QualityTier::from_str)]
    quality: Option<QualityTier>,
    #[arg(short, long)]
    out: Option<PathBuf>,
    /// Run a health check against every configured provider. Each check is billed.
    #[arg(long)]
    health: bool,
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();
    let dotenv_loaded = dotenv::dotenv().is_ok();

    logger::init_with_config(LoggerConfig::from_env(&ProcessEnv))?;
    logger::log_startup_info(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    if dotenv_loaded {
        log::info!("✅ .env file loaded successfully");
    } else {
        log::warn!("⚠️  No .env file found, using system environment variables");
    }

    for provider in ProviderType::ALL {
        if let Some(key) = flyergen::config::provider_defaults(provider)
            .key_vars
            .iter()
            .find_map(|var| ProcessEnv.var(var))
        {
            log::debug!("🔑 {} key: {}", provider, logger::redact(&key));
        }
    }

    log::info!("🔄 Creating image provider factory...");
    let factory = match ImageProviderFactory::from_env() {
        Ok(factory) => factory,
        Err(e) => {
            log::error!("❌ Failed to initialize providers: {}", e);
            return Err(e.into());
        }
    };

    factory.validate_provider_setup();
    logger::log_provider_summary(&factory.get_provider_config_summary());

    if args.health {
        log::info!("🩺 Running provider health checks (each one is a billed generation)...");
        for (provider, health) in factory.get_providers_health().await {
            log::info!(
                "   {} healthy={} available={} circuit_open={}{}",
                provider,
                health.healthy,
                health.available,
                health.circuit_open,
                health
                    .last_error
                    .map(|e| format!(" last_error={}", e))
                    .unwrap_or_default()
            );
        }
    }

    if args.prompt.is_empty() {
        if !args.health {
            log::info!("💡 Pass a prompt to generate a flyer, see --help");
        }
        return Ok(());
    }

    let mut request = GenerationRequest::new(args.prompt.join(" "))
        .with_aspect_ratio(args.ratio)
        .with_user("cli");
    if let Some(quality) = args.quality {
        request = request.with_quality(quality);
    }

    if let Some(cost) = factory.estimate_cost(&request, args.provider) {
        log::info!("💰 Estimated cost: ${:.4}", cost);
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("🛑 Interrupted, cancelling generation");
            ctrl_c.cancel();
        }
    });

    let result = factory
        .generate_image_with_cancel(&request, args.provider, &cancel)
        .await?;

    let filename = args.out.unwrap_or_else(|| {
        PathBuf::from(format!(
            "flyer_{}_{}.{}",
            result.provider.as_str(),
            chrono::Utc::now().timestamp(),
            result.file_extension()
        ))
    });
    fs::write(&filename, &result.image_data)?;

    log::info!("💾 Image saved to: {}", filename.display());
    log::info!(
        "📏 {}x{} {} from {}, seed {}",
        result.metadata.width,
        result.metadata.height,
        result.mime_type,
        result.provider.display_name(),
        result
            .seed
            .map(|s| s.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    );
    Ok(())
}
