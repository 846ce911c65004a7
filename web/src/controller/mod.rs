pub(crate) mod counter_controller;
pub(crate) mod health_check_controller;
