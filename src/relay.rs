//! Data loop between the input and output connectors
//!
//! Each direction reads a buffer, runs it through its handler chain and
//! writes the result. A zero-length read means the source is done: the
//! destination is closed and the direction stops. In duplex mode the reverse
//! direction runs concurrently with the decode flag inverted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::connect::Connector;
use crate::handle::HandlerChain;
use crate::Result;

/// Relay between two connected connectors
pub struct Relay {
    input: Arc<dyn Connector>,
    output: Arc<dyn Connector>,
    forward: HandlerChain,
    backward: Option<HandlerChain>,
    decode: bool,
    delay: Duration,
}

impl Relay {
    /// Simplex relay from `input` to `output`
    ///
    /// `decode` selects whether `chain` decodes what the input delivers.
    pub fn new(
        input: Arc<dyn Connector>,
        output: Arc<dyn Connector>,
        chain: HandlerChain,
        decode: bool,
    ) -> Self {
        Self {
            input,
            output,
            forward: chain,
            backward: None,
            decode,
            delay: Duration::ZERO,
        }
    }

    /// Also relay from output to input, through its own `chain`
    pub fn duplex(mut self, chain: HandlerChain) -> Self {
        self.backward = Some(chain);
        self
    }

    /// Pause after every relayed buffer
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Run until every direction has seen end of stream
    ///
    /// On error both connectors are closed before the error is returned.
    pub async fn run(self) -> Result<()> {
        let Relay {
            input,
            output,
            mut forward,
            backward,
            decode,
            delay,
        } = self;
        let closed = AtomicBool::new(false);

        log::info!(
            "Relaying {} -> {}{}",
            input.name(),
            output.name(),
            if backward.is_some() { " (duplex)" } else { "" }
        );

        let result = match backward {
            None => pump(&*input, &*output, &mut forward, decode, delay, &closed).await,
            Some(mut backward) => tokio::try_join!(
                pump(&*input, &*output, &mut forward, decode, delay, &closed),
                pump(&*output, &*input, &mut backward, !decode, delay, &closed),
            )
            .map(|_| ()),
        };

        if let Err(e) = &result {
            log::error!("Relay stopped: {}", e);
            for connector in [&input, &output] {
                if let Err(e) = connector.close().await {
                    log::debug!("Closing {}: {}", connector.name(), e);
                }
            }
        }
        result
    }
}

/// One direction of the relay
async fn pump(
    from: &dyn Connector,
    to: &dyn Connector,
    chain: &mut HandlerChain,
    decode: bool,
    delay: Duration,
    closed: &AtomicBool,
) -> Result<()> {
    loop {
        let buf = match from.read().await {
            Ok(buf) => buf,
            // the other direction already shut the connector down
            Err(e) if closed.load(Ordering::Acquire) => {
                log::debug!("{} read after shutdown: {}", from.name(), e);
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        if buf.is_empty() {
            log::debug!("{} finished, closing {}", from.name(), to.name());
            closed.store(true, Ordering::Release);
            return to.close().await;
        }

        let out = chain.process(buf, decode)?;
        if !out.is_empty() && to.write(&out).await? == 0 {
            log::debug!("{} has no peer yet, dropped {} bytes", to.name(), out.len());
        }

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Statistics block printed on exit
pub fn stats_report(input: &dyn Connector, output: &dyn Connector) -> String {
    format!(
        "\nStats:\n- IN connector({}):\n  {}\n\n- OUT connector({}):\n  {}\n",
        input.name(),
        input.stats(),
        output.name(),
        output.stats()
    )
}
