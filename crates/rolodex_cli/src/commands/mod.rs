pub(crate) mod cancel;
pub(crate) mod history;
pub(crate) mod migrate;
pub(crate) mod status;
pub(crate) mod sync;
