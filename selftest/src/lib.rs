/*!

Provides utilities for testing the end-to-end driver using `kind` and
`docker`. We call this testing modality `selftest` to distinguish it from the
end-to-end tests the driver itself runs.

!*/

pub mod cluster;
pub mod driver_image;

pub use cluster::Cluster;
