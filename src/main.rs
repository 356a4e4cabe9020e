use anyhow::{Context, Result};
use essurvey::{parse_rounds, show_rounds, Format, Portal};
use std::{env, fs, path::PathBuf, time::Instant};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,essurvey=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configure ────────────────────────────────────────────────
    let portal = Portal::from_env().context("reading ESS_* configuration")?;
    let rounds = match env::var("ESS_ROUNDS") {
        Ok(raw) => parse_rounds(&raw).context("parsing ESS_ROUNDS")?,
        Err(_) => show_rounds(),
    };
    let format = env::var("ESS_FORMAT")
        .ok()
        .map(|raw| raw.parse::<Format>())
        .transpose()
        .context("parsing ESS_FORMAT")?;
    let out_dir = PathBuf::from(env::var("ESS_OUTPUT_DIR").unwrap_or_else(|_| "parquet".into()));
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    info!(?rounds, ?format, out = %out_dir.display(), "configured");

    // ─── 3) import & write ───────────────────────────────────────────
    let start = Instant::now();
    let imported = match portal.import_rounds(&rounds, None, format) {
        Ok(imported) => imported,
        Err(e) => {
            error!(kind = ?e.kind(), "import failed: {e}");
            return Err(e.into());
        }
    };
    for table in imported.tables() {
        let path = out_dir.join(format!("ess{}.parquet", table.round));
        table
            .write_parquet(&path)
            .with_context(|| format!("writing round {}", table.round))?;
    }

    info!(
        tables = imported.len(),
        elapsed = ?start.elapsed(),
        "all done"
    );
    Ok(())
}
