//! Request loop of the stdio plugin protocol
//!
//! `configure`, `get_schema` and `validate_resource` run inline on the read
//! loop. Resource operations are spawned so slow remote calls on one
//! instance do not hold up others; their responses funnel through a single
//! writer task.

use std::io;
use std::sync::Arc;

use g42vb_core::provider::{BoxFuture, ErrorKind, Provider, ProviderError, ProviderResult};
use g42vb_provider::resources::{self, data_source_types, resource_types};
use g42vb_provider::{G42vbProvider, ProviderSettings};
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::protocol::{Call, HANDSHAKE, Request, Response, state_to_json};

/// Builds a provider from host settings
pub type ConfigureFn =
    Box<dyn Fn(ProviderSettings) -> BoxFuture<'static, ProviderResult<Arc<dyn Provider>>> + Send + Sync>;

pub struct Server {
    configure: ConfigureFn,
    provider: Option<Arc<dyn Provider>>,
}

impl Server {
    pub fn new(configure: ConfigureFn) -> Self {
        Self {
            configure,
            provider: None,
        }
    }

    /// Server configuring a real g42vbcloud provider, with env fallbacks
    pub fn g42vbcloud() -> Self {
        Self::new(Box::new(
            |settings: ProviderSettings| -> BoxFuture<'static, ProviderResult<Arc<dyn Provider>>> {
                Box::pin(async move {
                    let settings = settings.with_env_fallbacks();
                    let provider = G42vbProvider::configure(&settings).await?;
                    Ok(Arc::new(provider) as Arc<dyn Provider>)
                })
            },
        ))
    }

    /// Serve requests until `stop` or end of input
    pub async fn serve<R, W>(mut self, reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Response>();

        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            writer.write_all(format!("{}\n", HANDSHAKE).as_bytes()).await?;
            writer.flush().await?;
            while let Some(response) = rx.recv().await {
                let mut line = serde_json::to_string(&response).map_err(io::Error::other)?;
                line.push('\n');
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await?;
            }
            Ok::<_, io::Error>(())
        });

        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let request: Request = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    log::warn!("Invalid request line: {}", e);
                    let error = ProviderError::new(format!("Invalid request: {}", e))
                        .with_kind(ErrorKind::ConfigurationInvalid);
                    let _ = tx.send(Response::err(serde_json::Value::Null, &error));
                    continue;
                }
            };

            log::debug!("<- {} (id {})", request.method, request.id);
            let id = request.id;
            let call = match Call::decode(&request.method, request.params) {
                Ok(call) => call,
                Err(e) => {
                    let _ = tx.send(Response::err(id, &e));
                    continue;
                }
            };

            match call {
                Call::Stop => {
                    log::info!("Stop requested");
                    let _ = tx.send(Response::ok(id, json!({})));
                    break;
                }
                Call::GetSchema => {
                    let _ = tx.send(Response::ok(id, schema_document()));
                }
                Call::Configure(settings) => {
                    let response = match (self.configure)(settings).await {
                        Ok(provider) => {
                            log::info!("Provider {} configured", provider.name());
                            self.provider = Some(provider);
                            Response::ok(id, json!({}))
                        }
                        Err(e) => {
                            log::error!("Configure failed: {}", e);
                            Response::err(id, &e)
                        }
                    };
                    let _ = tx.send(response);
                }
                Call::ValidateResource(resource) => {
                    let response = match resources::validate_resource(&resource) {
                        Ok(()) => Response::ok(id, json!({})),
                        Err(e) => Response::err(id, &e),
                    };
                    let _ = tx.send(response);
                }
                call => {
                    let Some(provider) = self.provider.clone() else {
                        let error = ProviderError::configuration(
                            "Provider is not configured; send `configure` first",
                        );
                        let _ = tx.send(Response::err(id, &error));
                        continue;
                    };
                    let tx = tx.clone();
                    let request_id = id.clone();
                    let operation = tokio::spawn(async move {
                        match dispatch(provider.as_ref(), call).await {
                            Ok(result) => Response::ok(id, result),
                            Err(e) => {
                                log::debug!("Operation failed: {}", e);
                                Response::err(id, &e)
                            }
                        }
                    });
                    // Every request gets an answer, even when the operation panics
                    tokio::spawn(async move {
                        let response = match operation.await {
                            Ok(response) => response,
                            Err(e) => {
                                log::error!("Operation for request {} aborted: {}", request_id, e);
                                let error = ProviderError::new(format!("Operation aborted: {}", e))
                                    .with_kind(ErrorKind::Internal);
                                Response::err(request_id, &error)
                            }
                        };
                        let _ = tx.send(response);
                    });
                }
            }
        }

        // Pending operations still hold senders; the writer drains them
        drop(tx);
        writer_task.await.map_err(io::Error::other)?
    }
}

async fn dispatch(provider: &dyn Provider, call: Call) -> ProviderResult<serde_json::Value> {
    match call {
        Call::Create(resource) => {
            log::info!("Creating {}", resource.id);
            provider.create(&resource).await.map(|s| state_to_json(&s))
        }
        Call::Read(id, identifier) => provider
            .read(&id, identifier.as_deref())
            .await
            .map(|s| state_to_json(&s)),
        Call::Update {
            id,
            identifier,
            prior,
            desired,
        } => provider
            .update(&id, &identifier, &prior, &desired)
            .await
            .map(|s| state_to_json(&s)),
        Call::Delete(id, identifier) => {
            log::info!("Deleting {} ({})", id, identifier);
            provider.delete(&id, &identifier).await.map(|()| json!({}))
        }
        Call::Import(id, import_id) => {
            log::info!("Importing {} from {}", id, import_id);
            provider.import(&id, &import_id).await.map(|s| state_to_json(&s))
        }
        Call::ReadDataSource(resource) => provider
            .read_data_source(&resource)
            .await
            .map(|s| state_to_json(&s)),
        Call::GetSchema | Call::Configure(_) | Call::ValidateResource(_) | Call::Stop => {
            Err(ProviderError::new("Request must be handled by the read loop"))
        }
    }
}

/// Provider, resource and data source schemas served by `get_schema`
pub fn schema_document() -> serde_json::Value {
    let collect = |types: Vec<Box<dyn g42vb_core::provider::ResourceType>>| {
        types
            .into_iter()
            .map(|t| (t.name().to_string(), t.schema().to_json()))
            .collect::<serde_json::Map<_, _>>()
    };
    json!({
        "provider": ProviderSettings::schema().to_json(),
        "resource_schemas": collect(resource_types()),
        "data_source_schemas": collect(data_source_types()),
    })
}
