pub mod alert;
pub mod color;
pub mod io;
pub mod mux;
pub mod raster;
pub mod save;
pub mod state;
pub mod stroke;
pub mod units;

pub use state::{book::Book, page::Page, Boundary};
pub use stroke::Stroke;
