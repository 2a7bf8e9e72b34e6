pub mod fetch_settings_factory;

pub use fetch_settings_factory::FetchSettingsFactory;
