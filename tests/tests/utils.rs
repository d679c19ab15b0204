use std::sync::OnceLock;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_test_writer()
            .init();
    });
}
