pub(crate) mod presence;
