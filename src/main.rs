use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use courier_beacon::config::Config;
use courier_beacon::http::{HttpClient, UreqClient};
use courier_beacon::location::{
    AddressResolver, GeocodeCache, KeyedReverseGeocoder, LocationRecord, NominatimGeocoder,
};
use courier_beacon::map::{ContainerId, DeliveryMapView, HeadlessDocument, MapViewController, RenderRequest};
use courier_beacon::orders::{HttpOrderService, OrderService};
use courier_beacon::reconciler::LocationSourceReconciler;
use courier_beacon::server::{self, AppState};
use courier_beacon::tracking::{SimulatedSensor, TrackingSession};
use courier_beacon::tracking::simulated::{DEFAULT_DROP, DEFAULT_PICKUP};

/// Courier Beacon: live courier location sync and delivery-location lookup.
///
/// Examples:
///   beacon resolve --pincode 560001
///   beacon resolve --pincode 560001 --order-id 42
///   beacon track --order-id 42 --duration 60
///   beacon update-now --order-id 42
///   beacon show --pincode 560001 --address "12 MG Road"
///   beacon serve --port 3000
#[derive(Parser)]
#[command(name = "beacon", version, about, long_about = None)]
struct Cli {
    /// Config file. Defaults to ~/.courier-beacon/config.json.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Order service base URL.
    #[arg(long, global = true, env = "COURIER_ORDER_SERVICE_URL")]
    order_service_url: Option<String>,

    /// Maps credential for the map script and reverse geocoding.
    #[arg(long, global = true, env = "COURIER_MAPS_API_KEY", hide_env_values = true)]
    maps_api_key: Option<String>,

    /// Do not read or write the geocode cache.
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the delivery location for a pincode (and optional order).
    Resolve(LocationArgs),
    /// Track a simulated courier and push its location to the order service.
    Track(TrackArgs),
    /// Take one fix and push it right away.
    UpdateNow {
        #[arg(long)]
        order_id: String,
    },
    /// Render the delivery map headlessly and print the binding.
    Show {
        #[command(flatten)]
        location: LocationArgs,
        /// Map container id.
        #[arg(long, default_value = "delivery-map")]
        container: String,
    },
    /// Serve the HTTP API.
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, short = 'p', default_value_t = 3000)]
        port: u16,
    },
}

#[derive(Args)]
struct LocationArgs {
    #[arg(long)]
    pincode: String,
    #[arg(long)]
    order_id: Option<String>,
    /// Address shown when the location has none.
    #[arg(long)]
    address: Option<String>,
}

#[derive(Args)]
struct TrackArgs {
    #[arg(long)]
    order_id: String,
    /// Stop after this many seconds. Runs until Ctrl+C otherwise.
    #[arg(long)]
    duration: Option<u64>,
    /// Sync period in seconds. Overrides the config.
    #[arg(long)]
    interval: Option<u64>,
    /// Route steps between pickup and drop.
    #[arg(long, default_value_t = 10)]
    steps: usize,
    /// Seconds between simulated samples.
    #[arg(long, default_value_t = 3)]
    sample_every: u64,
}

struct Services {
    config: Config,
    resolver: Arc<AddressResolver>,
    orders: Arc<dyn OrderService>,
}

impl Services {
    fn build(cli: &Cli) -> Result<Self, String> {
        let mut config = Config::load(cli.config.clone()).map_err(|e| e.to_string())?;
        if let Some(url) = &cli.order_service_url {
            config.order_service_url = url.clone();
        }
        if let Some(key) = &cli.maps_api_key {
            config.maps_api_key = Some(key.clone());
        }
        if cli.no_cache {
            config.cache_geocodes = false;
        }

        let client: Arc<dyn HttpClient> = Arc::new(UreqClient::new(config.user_agent.clone()));
        let forward = Arc::new(NominatimGeocoder::new(client.clone(), config.nominatim_url.clone()));
        let reverse = Arc::new(KeyedReverseGeocoder::new(
            client.clone(),
            config.reverse_geocode_url.clone(),
            config.maps_api_key.clone(),
        ));
        let mut resolver = AddressResolver::new(forward, reverse);
        if config.cache_geocodes {
            resolver = resolver.with_cache(GeocodeCache::load_from(GeocodeCache::default_path()));
        }
        let orders = Arc::new(HttpOrderService::new(client, config.order_service_url.clone()));

        Ok(Self {
            config,
            resolver: Arc::new(resolver),
            orders,
        })
    }

    fn reconciler(&self) -> Arc<LocationSourceReconciler> {
        Arc::new(LocationSourceReconciler::new(self.orders.clone(), self.resolver.clone()))
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let out = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let services = Services::build(&cli)?;

    match cli.command {
        Command::Resolve(args) => {
            let location = services
                .reconciler()
                .resolve(args.order_id.as_deref(), &args.pincode, args.address.as_deref())
                .await
                .map_err(|e| e.to_string())?;
            print_json(&location)
        }
        Command::Track(args) => track(&services, args).await,
        Command::UpdateNow { order_id } => {
            let session = TrackingSession::new(
                order_id,
                Arc::new(SimulatedSensor::default()),
                services.resolver.clone(),
                services.orders.clone(),
            );
            let record = session.update_now().await.map_err(|e| e.to_string())?;
            print_json(&record)
        }
        Command::Show { location, container } => show(&services, location, container).await,
        Command::Serve { host, port } => {
            let state = Arc::new(AppState {
                reconciler: services.reconciler(),
                resolver: services.resolver.clone(),
            });
            server::start(state, &host, port).await.map_err(|e| e.to_string())
        }
    }
}

async fn track(services: &Services, args: TrackArgs) -> Result<(), String> {
    let sensor = SimulatedSensor::new(
        DEFAULT_PICKUP,
        DEFAULT_DROP,
        args.steps,
        Duration::from_secs(args.sample_every.max(1)),
    );
    let period = args
        .interval
        .map(|s| Duration::from_secs(s.max(1)))
        .unwrap_or_else(|| services.config.sync_interval());

    let session = TrackingSession::new(
        args.order_id,
        Arc::new(sensor),
        services.resolver.clone(),
        services.orders.clone(),
    )
    .with_sync_period(period);

    session.on_location_update(Arc::new(|record: &LocationRecord| {
        if let Ok(line) = serde_json::to_string(record) {
            println!("{}", line);
        }
    }));

    session.start().await.map_err(|e| e.to_string())?;
    eprintln!("  Tracking every {}s. Press Ctrl+C to stop.", period.as_secs());

    match args.duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }

    session.stop().await;
    let status = session.status().await;
    if let Some(error) = &status.error {
        tracing::warn!(%error, "Last tracking error");
    }
    Ok(())
}

async fn show(services: &Services, args: LocationArgs, container: String) -> Result<(), String> {
    let document = HeadlessDocument::new();
    let controller = Arc::new(MapViewController::new(
        document.clone(),
        services.config.provider_script_url(),
    ));
    let view = DeliveryMapView::new(controller.clone(), services.reconciler());
    let container = ContainerId(container);

    let request = RenderRequest {
        pincode: args.pincode,
        address: args.address,
        order_id: args.order_id,
    };
    let state = view.render(&container, &request).await;
    let binding = controller.binding(&container);
    let markers = document.widget().markers();
    controller.teardown(&container).await;

    print_json(&serde_json::json!({
        "view": state,
        "binding": binding,
        "markers": markers,
    }))?;

    match view.status_slot().current() {
        Some(message) => Err(message),
        None => Ok(()),
    }
}
