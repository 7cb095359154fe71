mod routes;

use anyhow::{anyhow, Result};
use botpanel::{config::structs::Web, panel::Panel};
use rocket::{figment::Provider, routes, Build, Rocket};
use std::sync::Arc;

fn build<P: Provider>(panel: Arc<Panel>, provider: P) -> Rocket<Build> { rocket::custom(provider).manage(panel).mount("/", routes![routes::health]) }

pub async fn start(panel: Arc<Panel>, web: &Web) -> Result<()> {
    let figment = rocket::Config::figment()
        .merge(("address", web.address.clone()))
        .merge(("port", web.port))
        .merge(("log_level", "off"));

    build(panel, figment).launch().await.map_err(|err| anyhow!("health server failed: {err}"))?;
    Ok(())
}
