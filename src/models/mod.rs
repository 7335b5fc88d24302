//! Generator and discriminator architectures.
pub mod dcgan;
pub mod toy;

pub use dcgan::{DcganDiscriminator, DcganGenerator};
