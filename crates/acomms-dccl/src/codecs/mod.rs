//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Built-in field codecs."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
mod boolean;
mod enumeration;
mod message;
mod modem_id;
mod numeric;
mod static_value;
mod text;
mod time;

pub use boolean::DefaultBoolCodec;
pub use enumeration::DefaultEnumCodec;
pub use message::DefaultMessageCodec;
pub use modem_id::ModemIdCodec;
pub use numeric::DefaultNumericCodec;
pub use static_value::StaticCodec;
pub use text::DefaultTextCodec;
pub use time::TimeCodec;
