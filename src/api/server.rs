use crate::api::routes;
use crate::cache::Caches;
use crate::config::SharedConfig;
use std::future::Future;

#[derive(Clone)]
pub(super) struct AppState {
    pub config: SharedConfig,
    pub caches: Caches,
}

pub fn new(config: SharedConfig, caches: Caches) -> impl Future<Output = hyper::Result<()>> {
    axum::Server::bind(&config.api_bind_addr)
        .serve(routes::new(AppState { config, caches }).into_make_service())
}
