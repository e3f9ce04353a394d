pub mod error;
pub mod session;
pub mod upload;

pub use error::SessionError;
pub use session::{ImageInfo, Session, SessionSnapshot, StateName};
pub use upload::{ImageType, UploadedImage, decode_upload};
