use axum::{
    Router,
    extract::Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use clap::{Args, Parser, Subcommand};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    BUILTIN_REFORMS, Chart, EntitySelector, Legislation, ParameterOverride, ParameterPath,
    ParameterTree, Period, ReformSet, ReformVariant, RenderedChart, ReportError, RequestedOutputs,
    Scenario, build_chart, builtin_reform, generate_report, reference_legislation,
};
use crate::render::PlotlyHtmlSink;

#[derive(Debug, Parser)]
#[command(name = "taxsim", about = "Compare tax-benefit reforms across scenarios")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(about = "Render one chart per scenario from a report configuration file")]
    Report(ReportArgs),
    #[command(about = "Serve the report endpoint over HTTP")]
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ReportArgs {
    #[arg(long, help = "Report configuration (JSON)")]
    pub config: PathBuf,
    #[arg(long, default_value = "charts", help = "Directory receiving one HTML chart per scenario")]
    pub output_dir: PathBuf,
    #[arg(long, help = "Parameter tree (JSON) replacing the reference parameters")]
    pub parameters: Option<PathBuf>,
    #[arg(long, help = "Also open each chart in a browser once written (does not block)")]
    pub show: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReportConfig {
    scenarios: IndexMap<String, Scenario>,
    reforms: Vec<VariantConfig>,
    outputs: IndexMap<String, Vec<String>>,
    entity: Option<EntitySelector>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantConfig {
    name: String,
    #[serde(default)]
    reforms: Vec<String>,
    #[serde(default)]
    overrides: Vec<OverrideConfig>,
}

#[derive(Debug, Deserialize)]
struct OverrideConfig {
    path: String,
    period: String,
    #[serde(default)]
    stop: Option<String>,
    value: f64,
}

#[derive(Clone)]
pub struct ReportPlan {
    pub scenarios: IndexMap<String, Scenario>,
    pub variants: Vec<ReformVariant<Legislation>>,
    pub outputs: RequestedOutputs,
    pub selector: EntitySelector,
}

#[derive(Debug, Serialize)]
struct ReportResponse {
    charts: Vec<Chart>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_variant(config: VariantConfig, base: &Legislation) -> Result<ReformVariant<Legislation>, String> {
    let mut set = ReformSet::new(config.name.clone());

    for reform_name in &config.reforms {
        let reform = builtin_reform(reform_name)
            .ok_or_else(|| {
                format!(
                    "reform {:?} in variant {:?} is unknown (known: {})",
                    reform_name,
                    config.name,
                    BUILTIN_REFORMS.join(", ")
                )
            })?
            .map_err(|e| e.to_string())?;
        set.push(Box::new(reform));
    }

    for (idx, entry) in config.overrides.iter().enumerate() {
        let path: ParameterPath = entry
            .path
            .parse()
            .map_err(|e| format!("variant {:?} override {idx}: {e}", config.name))?;
        let period: Period = entry
            .period
            .parse()
            .map_err(|e| format!("variant {:?} override {idx}: {e}", config.name))?;
        let mut reform =
            ParameterOverride::new(format!("{}#{idx}", config.name), path, period, entry.value);
        if let Some(stop) = &entry.stop {
            let stop: Period = stop
                .parse()
                .map_err(|e| format!("variant {:?} override {idx}: {e}", config.name))?;
            if stop.start() <= period.start() {
                return Err(format!(
                    "variant {:?} override {idx}: stop {stop} must come after period {period}",
                    config.name
                ));
            }
            reform = reform.until(stop);
        }
        set.push(Box::new(reform));
    }

    let legislation = if set.is_empty() {
        base.clone()
    } else {
        base.clone()
            .apply_reform(&set)
            .map_err(|e| format!("variant {:?}: {e}", config.name))?
    };
    Ok(ReformVariant::new(config.name, legislation))
}

pub fn build_plan(config: ReportConfig, base: &Legislation) -> Result<ReportPlan, String> {
    if config.scenarios.is_empty() {
        return Err("scenarios must contain at least one scenario".to_string());
    }
    if config.reforms.is_empty() {
        return Err("reforms must contain at least one variant".to_string());
    }
    if config.outputs.is_empty() {
        return Err("outputs must request at least one quantity".to_string());
    }

    let mut outputs = RequestedOutputs::new();
    for (quantity, labels) in config.outputs {
        if labels.is_empty() {
            return Err(format!("outputs.{quantity} must list at least one period"));
        }
        let periods = labels
            .iter()
            .map(|label| label.parse::<Period>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("outputs.{quantity}: {e}"))?;
        outputs.insert(quantity, periods);
    }

    let mut variants = Vec::with_capacity(config.reforms.len());
    for variant in config.reforms {
        if variant.name.trim().is_empty() {
            return Err("reform variant names must not be empty".to_string());
        }
        if variants
            .iter()
            .any(|v: &ReformVariant<Legislation>| v.name == variant.name)
        {
            return Err(format!("reform variant {:?} is listed twice", variant.name));
        }
        variants.push(build_variant(variant, base)?);
    }

    Ok(ReportPlan {
        scenarios: config.scenarios,
        variants,
        outputs,
        selector: config.entity.unwrap_or_default(),
    })
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, String> {
    let raw = fs::read_to_string(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| format!("invalid JSON in {}: {e}", path.display()))
}

fn base_legislation(parameters: Option<&Path>) -> Result<Legislation, String> {
    let legislation = reference_legislation();
    match parameters {
        None => Ok(legislation),
        Some(path) => {
            let tree: ParameterTree = read_json(path)?;
            Ok(legislation.replace_parameters(tree))
        }
    }
}

pub fn run_report(args: &ReportArgs) -> Result<Vec<RenderedChart>, String> {
    let config: ReportConfig = read_json(&args.config)?;
    let base = base_legislation(args.parameters.as_deref())?;
    let plan = build_plan(config, &base)?;
    info!(
        scenarios = plan.scenarios.len(),
        variants = plan.variants.len(),
        outputs = plan.outputs.len(),
        "generating report"
    );

    let mut sink = PlotlyHtmlSink::new(&args.output_dir, args.show);
    generate_report(
        &plan.scenarios,
        &plan.variants,
        &plan.outputs,
        plan.selector,
        &mut sink,
    )
    .map_err(|e| e.to_string())
}

fn build_charts(plan: &ReportPlan) -> Result<Vec<Chart>, ReportError> {
    plan.scenarios
        .iter()
        .map(|(name, scenario)| {
            build_chart(name, scenario, &plan.variants, &plan.outputs, plan.selector)
        })
        .collect()
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/report", post(report_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!("report API listening on http://{addr}");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn report_handler(Json(config): Json<ReportConfig>) -> Response {
    let outcome = tokio::task::spawn_blocking(move || {
        let plan = build_plan(config, &reference_legislation())
            .map_err(|msg| (StatusCode::BAD_REQUEST, msg))?;
        build_charts(&plan).map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
    })
    .await;

    match outcome {
        Ok(Ok(charts)) => json_response(StatusCode::OK, ReportResponse { charts }),
        Ok(Err((status, msg))) => {
            warn!(%status, "report request failed: {msg}");
            error_response(status, &msg)
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
