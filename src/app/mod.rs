pub mod serve;

// re-export
pub use serve::serve;

use std::{net::SocketAddr, sync::Arc};

use derive_more::Deref;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::{
    config::AppConfig, recaptcha_client::RecaptchaClient, sheets::SheetsClient,
    templ_manager::TemplateManager, utils, Result,
};

// ###################################
// ->  Structs
// ###################################
pub struct App {
    pub app_state: AppState,
    pub listener: TcpListener,
}
impl App {
    pub fn new(app_state: AppState, listener: TcpListener) -> Self {
        App {
            app_state,
            listener,
        }
    }

    /// Builds the clients described by `config` and binds the listener.
    /// Spreadsheet credentials that are missing or unusable leave `sheets_client` empty,
    /// signups then fail with a configuration error while the rest of the site keeps serving.
    pub async fn build_from_config(config: AppConfig) -> Result<Self> {
        let tm = TemplateManager::init();
        let recaptcha_client = RecaptchaClient::new(
            &config.recaptcha_config.url,
            config.recaptcha_config.timeout(),
        )?;

        let sheets_client = match config.sheets_config.credentials() {
            Some(credentials) => match SheetsClient::new(
                &config.sheets_config.api_url,
                &config.sheets_config.token_url,
                credentials,
                config.sheets_config.timeout(),
            ) {
                Ok(client) => Some(client),
                Err(er) => {
                    error!(
                        "{:<20} - spreadsheet client unusable, signups will fail: {}",
                        "build_from_config",
                        utils::error_chain(&er)
                    );
                    None
                }
            },
            None => {
                warn!(
                    "{:<20} - spreadsheet credentials missing, signups will fail",
                    "build_from_config"
                );
                None
            }
        };

        if config.recaptcha_config.verification_secret().is_none() {
            warn!(
                "{:<20} - proof token verification is disabled",
                "build_from_config"
            );
        }

        let addr = SocketAddr::from((config.net_config.host, config.net_config.app_port));
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        info!("{:<20} - {}", "Listening on:", addr);

        let app_state = AppState::new(config, tm, recaptcha_client, sheets_client);

        let app = App::new(app_state, listener);
        Ok(app)
    }
}

pub struct InternalState {
    pub config: AppConfig,
    pub templ_mgr: TemplateManager,
    pub recaptcha_client: RecaptchaClient,
    /// `None` while the spreadsheet credentials aren't configured.
    pub sheets_client: Option<SheetsClient>,
}

/// Application state containing all global data.
/// It implements `Deref` to easily access the fields on `InternalState`
/// Uses an `Arc` so it can be cloned around.
#[derive(Clone, Deref)]
pub struct AppState(Arc<InternalState>);

impl AppState {
    pub fn new(
        config: AppConfig,
        templ_mgr: TemplateManager,
        recaptcha_client: RecaptchaClient,
        sheets_client: Option<SheetsClient>,
    ) -> Self {
        AppState(Arc::new(InternalState {
            config,
            templ_mgr,
            recaptcha_client,
            sheets_client,
        }))
    }
}
