pub(crate) mod admin;
pub(crate) mod gate;
pub(crate) mod score;
