//! Capability declarations: the effects this core can ask its shells to
//! perform.
//!
//! `Render` and `Http` come from the Crux ecosystem; storage, auth, and
//! the device capabilities are custom operations each shell implements
//! natively (Keychain/Keystore, ASWebAuthenticationSession/Custom Tabs,
//! APNs/FCM, the system camera).

pub mod auth;
#[cfg(feature = "camera")]
pub mod camera;
#[cfg(feature = "push")]
pub mod push;
pub mod storage;

use crux_core::render::Render;
use crux_http::Http;

use crate::app::App;
use crate::event::Event;

pub use auth::Auth;
#[cfg(feature = "camera")]
pub use camera::Camera;
#[cfg(feature = "push")]
pub use push::Push;
pub use storage::Storage;

#[derive(crux_core::macros::Effect)]
#[effect(app = "App")]
pub struct Capabilities {
    pub render: Render<Event>,
    pub http: Http<Event>,
    pub storage: Storage<Event>,
    pub auth: Auth<Event>,
    #[cfg(feature = "push")]
    pub push: Push<Event>,
    #[cfg(feature = "camera")]
    pub camera: Camera<Event>,
}
