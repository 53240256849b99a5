use std::{error::Error, net::SocketAddr};

use axum_server::tls_rustls::RustlsConfig;
use kokyaku::{
    domain::{customer::CustomerRepository, transaction::Transactional},
    infrastructure::{memory::MemoryCustomerStore, mongo::MongoCustomerStore},
    KokyakuConfig, Store,
};
use kokyaku_web::{router, AppState};
use tracing::{error, info, Level};

#[tokio::main]
async fn main() {
    match KokyakuConfig::load() {
        Ok(config) => {
            tracing_subscriber::fmt()
                .with_max_level(Level::from(&config.logger.level))
                .init();
            if let Err(error) = run(&config).await {
                error!("アプリケーションエラー: {}", error);
            }
        }
        Err(error) => {
            tracing_subscriber::fmt::init();
            error!("アプリケーションエラー: {}", error)
        }
    }
}

async fn run(config: &KokyakuConfig) -> Result<(), Box<dyn Error>> {
    match &config.store {
        Store::Memory => {
            info!("インメモリストアで起動します");
            serve(config, MemoryCustomerStore::new()).await
        }
        Store::Mongodb { url, database } => {
            let store = MongoCustomerStore::connect(url, database).await?;
            serve(config, store).await
        }
    }
}

async fn serve<S>(config: &KokyakuConfig, store: S) -> Result<(), Box<dyn Error>>
where
    S: CustomerRepository + Transactional + Clone + 'static,
    S::Transaction: CustomerRepository,
{
    let app = router(AppState::new(store, &config.server.public_host));
    let addr: SocketAddr = config.server.address.parse()?;
    match &config.server.tls {
        Some(tls) => {
            let rustls = RustlsConfig::from_pem_file(&tls.cert, &tls.key).await?;
            info!("HTTPSで待ち受けます: {}", addr);
            axum_server::bind_rustls(addr, rustls)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!("HTTPで待ち受けます: {}", addr);
            axum_server::bind(addr)
                .serve(app.into_make_service())
                .await?;
        }
    }
    Ok(())
}
