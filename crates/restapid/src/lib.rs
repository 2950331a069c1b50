//! Overlay provisioning REST service for SONiC
//!
//! restapid exposes the v1 REST API used by an SDN controller to provision
//! VXLAN tunnel endpoints, VNETs, VLAN interfaces with their members and
//! neighbors, VNET routes and default-VRF static routes. Configuration is
//! written to CONFIG_DB and APPL_DB; orchagent and the cfgmgr daemons
//! consume it from there.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌──────────────────────────┐    ┌───────────────┐
//! │  HTTP/HTTPS  │───▶│  Gate (mutex + CN check) │───▶│  OverlayMgr   │
//! │  api::router │    └──────────────────────────┘    │  allocator    │
//! └──────────────┘                                    │  tunnel cache │
//!                                                     └───────┬───────┘
//!                                ┌───────────────┬────────────┼────────────┐
//!                                ▼               ▼            ▼            ▼
//!                            CONFIG_DB        APPL_DB    Dataplane RPC   ARP RPC
//! ```
//!
//! Resource operations are split by concern, all on [`OverlayMgr`]:
//! `tunnel_mgr`, `vnet_mgr`, `vlan_mgr`, `route_mgr`, `static_route` and
//! `system`.

pub mod allocator;
pub mod api;
pub mod config;
pub mod error;
pub mod gate;
pub mod models;
pub mod overlay_mgr;
pub mod propagation;
pub mod rpc;
pub mod server;
pub mod tables;
pub mod types;

mod route_mgr;
mod static_route;
mod system;
mod tunnel_mgr;
mod vlan_mgr;
mod vnet_mgr;

pub use allocator::IdAllocator;
pub use api::{build_router, AppState};
pub use config::Args;
pub use error::{ApiError, ApiResult};
pub use gate::{Gate, PeerIdentity};
pub use overlay_mgr::{OverlayMgr, Stores};
pub use propagation::{FixedInterval, PropagationWait};
pub use system::{parse_ping_output, INDEX_BANNER};
