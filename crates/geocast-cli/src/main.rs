use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use geocast::{
    cache::{FileStore, ForecastStore},
    config::{DEFAULT_LOG_FILTER, RuntimeConfig},
    error::{
        AppError, ERROR_CODE_RUNTIME_PROVIDER_INIT, ERROR_CODE_RUNTIME_SERIALIZE,
        ERROR_CODE_USER_OUTPUT_MODE_CONFLICT,
    },
    geocoding::{AddressResolver, Geocoder},
    model::{ForecastOutput, ForecastRequest, OutputMode},
    providers::{HttpTransport, ReqwestTransport, nominatim::NominatimGeocoder},
    service::{self, ForecastEngine},
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Address-based weather forecasts from the US National Weather Service"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Forecast periods and a daily summary for an address or coordinate pair.
    Forecast {
        #[arg(long)]
        address: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        lat: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        lon: Option<f64>,
        /// Cache partition for coordinate lookups.
        #[arg(long)]
        postal_code: Option<String>,
        #[arg(long, value_enum)]
        output: Option<OutputModeArg>,
        #[arg(long)]
        json: bool,
    },
}

const ENVELOPE_SCHEMA_VERSION: &str = "v1";
const FORECAST_COMMAND: &str = "geocast.forecast";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputModeArg {
    Human,
    Json,
}

impl From<OutputModeArg> for OutputMode {
    fn from(value: OutputModeArg) -> Self {
        match value {
            OutputModeArg::Human => OutputMode::Text,
            OutputModeArg::Json => OutputMode::Json,
        }
    }
}

impl Cli {
    fn command_name(&self) -> &'static str {
        match &self.command {
            Commands::Forecast { .. } => FORECAST_COMMAND,
        }
    }

    fn output_mode_hint(&self) -> OutputMode {
        match &self.command {
            Commands::Forecast { output, json, .. } => {
                if *json {
                    OutputMode::Json
                } else if let Some(explicit) = output {
                    (*explicit).into()
                } else {
                    OutputMode::Text
                }
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let config = RuntimeConfig::from_env();
    init_tracing(&config.log_filter);

    let command = cli.command_name();
    let output_mode = cli.output_mode_hint();
    match run(cli, &config) {
        Ok(output) => println!("{output}"),
        Err(error) => {
            emit_error(command, output_mode, &error);
            std::process::exit(error.exit_code());
        }
    }
}

// stdout carries the command output, so logs go to stderr.
fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

fn run(cli: Cli, config: &RuntimeConfig) -> Result<String, AppError> {
    let transport = ReqwestTransport::from_config(config).map_err(|error| {
        AppError::runtime(
            ERROR_CODE_RUNTIME_PROVIDER_INIT,
            format!("failed to initialize HTTP client: {error}"),
        )
    })?;
    let resolver = AddressResolver::new(NominatimGeocoder::new(
        transport.clone(),
        config.geocoder_endpoint.clone(),
    ));
    let engine = ForecastEngine::from_config(transport, FileStore::new(&config.cache_dir), config);

    run_with(cli, &resolver, &engine)
}

fn run_with<G, T, S>(
    cli: Cli,
    resolver: &AddressResolver<G>,
    engine: &ForecastEngine<T, S>,
) -> Result<String, AppError>
where
    G: Geocoder,
    T: HttpTransport,
    S: ForecastStore,
{
    match cli.command {
        Commands::Forecast {
            address,
            lat,
            lon,
            postal_code,
            output,
            json,
        } => {
            let output_mode = resolve_output_mode(output, json)?;
            let request = ForecastRequest::new(
                address.as_deref(),
                lat,
                lon,
                postal_code.as_deref(),
                output_mode,
            )?;
            let output = service::resolve_forecast(resolver, engine, &request)?;

            match output_mode {
                OutputMode::Json => render_json_envelope(FORECAST_COMMAND, &output),
                OutputMode::Text => Ok(format_text_output(&output)),
            }
        }
    }
}

fn resolve_output_mode(
    output: Option<OutputModeArg>,
    json_flag: bool,
) -> Result<OutputMode, AppError> {
    match (output, json_flag) {
        (Some(OutputModeArg::Human), true) => Err(AppError::user(
            ERROR_CODE_USER_OUTPUT_MODE_CONFLICT,
            "conflicting output flags: --json requires --output json (got human)",
        )),
        (Some(mode), _) => Ok(mode.into()),
        (None, true) => Ok(OutputMode::Json),
        (None, false) => Ok(OutputMode::Text),
    }
}

fn render_json_envelope(command: &str, output: &ForecastOutput) -> Result<String, AppError> {
    let result = serde_json::to_value(output).map_err(|error| {
        AppError::runtime(
            ERROR_CODE_RUNTIME_SERIALIZE,
            format!("failed to serialize output: {error}"),
        )
    })?;
    serde_json::to_string(&json!({
        "schema_version": ENVELOPE_SCHEMA_VERSION,
        "command": command,
        "ok": true,
        "result": result,
    }))
    .map_err(|error| {
        AppError::runtime(
            ERROR_CODE_RUNTIME_SERIALIZE,
            format!("failed to serialize output envelope: {error}"),
        )
    })
}

fn render_error_envelope(command: &str, error: &AppError) -> String {
    let payload = json!({
        "schema_version": ENVELOPE_SCHEMA_VERSION,
        "command": command,
        "ok": false,
        "error": {
            "code": error.code,
            "message": error.message,
            "details": {
                "kind": error.kind_label(),
                "exit_code": error.exit_code(),
            }
        }
    });
    serde_json::to_string(&payload).unwrap_or_else(|serialize_error| {
        format!(
            "{{\"schema_version\":\"{}\",\"command\":\"{}\",\"ok\":false,\"error\":{{\"code\":\"{}\",\"message\":\"{}\"}}}}",
            ENVELOPE_SCHEMA_VERSION,
            command,
            ERROR_CODE_RUNTIME_SERIALIZE,
            escape_json_string(&format!(
                "failed to serialize error envelope: {serialize_error}"
            )),
        )
    })
}

fn emit_error(command: &str, output_mode: OutputMode, error: &AppError) {
    match output_mode {
        OutputMode::Json => println!("{}", render_error_envelope(command, error)),
        OutputMode::Text => eprintln!("error[{}]: {}", error.code, error.message),
    }
}

fn escape_json_string(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c if c < '\u{20}' => escaped.push_str(&format!("\\u{:04x}", c as u32)),
            c => escaped.push(c),
        }
    }
    escaped
}

fn format_text_output(output: &ForecastOutput) -> String {
    let location = match &output.location.address {
        Some(address) => address.clone(),
        None => format!(
            "{},{}",
            output.location.latitude, output.location.longitude
        ),
    };
    let mut lines = vec![format!("{location} | {}", output.freshness.label())];

    for item in &output.periods {
        let period = &item.period;
        lines.push(format!(
            "{}: {}°F {}, rain {}%",
            period.name,
            period.temperature,
            period.short_forecast,
            period.precipitation_probability.unwrap_or(0)
        ));
    }

    if !output.summary.is_empty() {
        lines.push(String::new());
        lines.push("Daily summary".to_string());
        for day in &output.summary {
            lines.push(format!(
                "{}: high {}°F, low {}°F, rain {}%",
                pretty_date(day.date),
                day.high_temp,
                day.low_temp,
                day.avg_chance_of_rain
            ));
        }
    }

    lines.join("\n")
}

fn pretty_date(date: NaiveDate) -> String {
    date.format("%A, %b %-d").to_string()
}
