mod bunch_header;
mod in_bunch;
mod out_bunch;

pub use bunch_header::{BunchFlags, BunchHeader};
pub use in_bunch::InBunch;
pub use out_bunch::OutBunch;
