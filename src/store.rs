pub(crate) mod gateway;
pub(crate) mod models;
pub(crate) mod postgres;

#[cfg(test)]
pub(crate) mod memory;
#[cfg(test)]
pub(crate) mod testutil;
