// Based on https://github.com/LukeMathWalker/tracing-actix-web/blob/main/examples/opentelemetry/src/main.rs#L15
fn init_telemetry() {
    use opentelemetry::global;
    use opentelemetry_sdk::propagation::TraceContextPropagator;
    use opentelemetry_sdk::runtime::TokioCurrentThread;
    use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::{EnvFilter, Registry};

    let app_name = "bookmarket_service";

    global::set_text_map_propagator(TraceContextPropagator::new());
    #[allow(deprecated)]
    let tracer = opentelemetry_jaeger::new_agent_pipeline()
        .with_service_name(app_name)
        .install_batch(TokioCurrentThread)
        .expect("Failed to install OpenTelemetry tracer.");

    // Tunable via `RUST_LOG` env variable
    let env_filter = EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("info"));
    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);
    let formatting_layer = BunyanFormattingLayer::new(app_name.into(), std::io::stdout);
    let subscriber = Registry::default()
        .with(env_filter)
        .with(telemetry)
        .with(JsonStorageLayer)
        .with(formatting_layer);
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to install `tracing` subscriber.")
}

async fn init_repositories(
    database: &bookmarket_service::settings::DatabaseSettings,
) -> anyhow::Result<(
    std::sync::Arc<dyn bookmarket_service::books_repository::BookRepository>,
    std::sync::Arc<dyn bookmarket_service::users_repository::UserRepository>,
)> {
    use std::sync::Arc;

    use anyhow::Context;
    use bookmarket_service::books_repository::{
        InMemoryBookRepository, PostgresBooksRepository, PostgresBooksRepositoryConfig,
    };
    use bookmarket_service::users_repository::{
        InMemoryUserRepository, PostgresUsersRepository, PostgresUsersRepositoryConfig,
    };

    if database.use_in_memory {
        tracing::info!("Using in memory repositories");
        return Ok((
            Arc::new(InMemoryBookRepository::default()),
            Arc::new(InMemoryUserRepository::default()),
        ));
    }

    let books = PostgresBooksRepository::init(PostgresBooksRepositoryConfig {
        hostname: database.hostname.clone(),
        username: database.username.clone(),
        password: database.password.clone(),
    })
    .await
    .context("Failed to init books repository")?;
    let users = PostgresUsersRepository::init(PostgresUsersRepositoryConfig {
        hostname: database.hostname.clone(),
        username: database.username.clone(),
        password: database.password.clone(),
    })
    .await
    .context("Failed to init users repository")?;
    Ok((Arc::new(books), Arc::new(users)))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    use std::sync::Arc;

    use actix_web::web::Data;
    use actix_web::{App, HttpServer};
    use anyhow::Context;
    use paperclip::actix::OpenApiExt;
    use tracing_actix_web::TracingLogger;

    use bookmarket_service::app_config::{config_app, json_config, payload_config, query_config};
    use bookmarket_service::auth::{
        Argon2CredentialHasher, CredentialHasher, JwtTokenService, TokenService,
    };
    use bookmarket_service::book_content_store::BookContentStore;
    use bookmarket_service::id_generator::IdGenerator;
    use bookmarket_service::inventory::BookInventory;
    use bookmarket_service::purchase::{PaymentGateway, PurchaseWorkflow, SimulatedPaymentGateway};
    use bookmarket_service::settings::{Settings, DEV_JWT_SECRET};

    init_telemetry();
    let settings = Settings::load().context("Failed to load settings")?;
    if settings.auth.jwt_secret == DEV_JWT_SECRET {
        tracing::warn!("Using the development jwt secret, set BOOKMARKET__AUTH__JWT_SECRET");
    }

    let (books, users) = init_repositories(&settings.database).await?;
    let tokens: Arc<dyn TokenService> = Arc::new(JwtTokenService::new(
        &settings.auth.jwt_secret,
        settings.auth.token_ttl_seconds,
    ));
    let hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2CredentialHasher);
    let ids = Arc::new(IdGenerator::new(settings.ids.instance_id));
    let gateway: Arc<dyn PaymentGateway> =
        Arc::new(SimulatedPaymentGateway::new(settings.purchase.failure_rate));

    let inventory = Data::new(BookInventory::new(
        books,
        users.clone(),
        BookContentStore::new(&settings.storage.root),
        ids.clone(),
    ));
    let purchases = Data::new(PurchaseWorkflow::new(users.clone(), gateway));
    let max_pdf_bytes = settings.storage.max_pdf_bytes;

    tracing::info!(
        "Starting HTTP server at http://{}:{}",
        settings.server.host,
        settings.server.port
    );
    HttpServer::new(move || {
        App::new()
            .wrap_api()
            .app_data(Data::new(users.clone()))
            .app_data(Data::new(tokens.clone()))
            .app_data(Data::new(hasher.clone()))
            .app_data(Data::new(ids.clone()))
            .app_data(inventory.clone())
            .app_data(purchases.clone())
            .app_data(json_config())
            .app_data(query_config())
            .app_data(payload_config(max_pdf_bytes))
            .wrap(TracingLogger::default())
            .configure(config_app)
            .with_json_spec_at("/apispec/v2")
            .build()
    })
    .bind((settings.server.host.as_str(), settings.server.port))?
    .run()
    .await?;
    Ok(())
}
