mod common;

mod auth {
    pub mod activate_test;
    pub mod flow_test;
    pub mod login_test;
    pub mod register_test;
}
