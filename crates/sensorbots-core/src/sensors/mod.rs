//! Sensor and actuator models attached to bodies as interactions.

pub mod acoustic;
pub mod bumper;
pub mod camera;
pub mod ground;
pub mod infrared;
pub mod landmark;
pub mod radio;

pub use acoustic::{
    ChannelBuffer, FourWayMicrophone, Microphone, RealisticWrite, ResponseModel, SoundSource,
    flat_response, inverse_square_response,
};
pub use bumper::{RotatingDistanceRing, bumper_ray_index, bumper_response, physical_index};
pub use camera::{CircularCam, CompositeCamera, DepthTest, PixelOperation};
pub use ground::GroundSensor;
pub use infrared::{InfraredResponse, InfraredSensor, ProximityResponse};
pub use landmark::{BinaryLandmarkCamera, ray_hits_landmark};
pub use radio::{CommunicationLink, Message, RadioTransceiver};
