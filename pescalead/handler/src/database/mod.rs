//! Database access: the managed database over its REST surface and the
//! company registry over a direct Postgres pool.

pub mod accessors;
pub mod cnpj;
pub mod entries;
pub mod postgrest;
