use botpanel::panel::Panel;
use std::sync::Arc;

use rocket::{
    get,
    serde::{json::Json, Serialize},
    State,
};

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub(crate) struct Health {
    status: &'static str,
    active_bots: usize,
}

/// Liveness plus the number of tracked programs. Reads the registry size
/// only; nothing is probed.
#[get("/")]
pub(crate) fn health(panel: &State<Arc<Panel>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        active_bots: panel.count(),
    })
}
