mod geolocation;
mod picker;
mod playback;

pub use self::geolocation::{
    Geolocation, GeolocationError, GeolocationOperation, GeolocationResult,
};
pub use self::picker::{
    ImagePicker, PickConfig, PickedImage, PickerError, PickerOperation, PickerResult,
};
pub use self::playback::{AudioPlayback, PlaybackOperation};

pub use crux_core::render::Render;
pub use crux_http::Http;

use crate::{App, Event};

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub render: Render<Event>,
    pub http: Http<Event>,
    pub geolocation: Geolocation<Event>,
    pub picker: ImagePicker<Event>,
    pub audio: AudioPlayback<Event>,
}
