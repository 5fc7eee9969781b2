use clap::ValueEnum;

use fastcharge_exchange::RemoteStoreBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliSecretTransport {
    DataApi,
    ObjectStorage,
}

impl From<CliSecretTransport> for RemoteStoreBackend {
    fn from(value: CliSecretTransport) -> Self {
        match value {
            CliSecretTransport::DataApi => RemoteStoreBackend::DataApi,
            CliSecretTransport::ObjectStorage => RemoteStoreBackend::ObjectStorage,
        }
    }
}
