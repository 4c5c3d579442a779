//! Check command handler: probe the external backends.

use anyhow::{Result, bail};
use serde_json::{Value, json};
use zunda_runtime::ObsSceneBackend;
use zunda_voice::VoicevoxClient;

use crate::bootstrap::CliContext;

/// Report VOICEVOX and OBS reachability. Fails if any enabled backend is down.
pub async fn execute(ctx: &CliContext) -> Result<()> {
    let settings = &ctx.settings;
    let mut failures = 0;

    println!("Settings: {}", ctx.config_path.display());

    let voicevox = VoicevoxClient::new(&settings.voicevox)?;
    match voicevox.version().await {
        Ok(version) => println!("VOICEVOX  ok           {} (engine {version})", voicevox.base_url()),
        Err(e) => {
            failures += 1;
            println!("VOICEVOX  unreachable  {}: {e}", voicevox.base_url());
            if settings.voicevox.fallback_simulated {
                println!("          speech will use the simulated synthesizer");
            }
        }
    }

    if settings.obs.enabled {
        let obs = ObsSceneBackend::new(&settings.obs);
        match obs.request("GetVersion", json!({})).await {
            Ok(data) => println!("OBS       ok           {} ({})", obs.url(), describe_obs(&data)),
            Err(e) => {
                failures += 1;
                println!("OBS       unreachable  {}: {e}", obs.url());
            }
        }
        obs.disconnect().await;
    } else {
        println!("OBS       disabled");
    }

    if failures > 0 {
        bail!("{failures} backend check(s) failed");
    }
    Ok(())
}

fn describe_obs(version: &Value) -> String {
    let field = |name: &str| version.get(name).and_then(Value::as_str).unwrap_or("?").to_string();
    format!(
        "OBS {}, obs-websocket {}",
        field("obsVersion"),
        field("obsWebSocketVersion")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obs_versions_are_described() {
        let data = json!({"obsVersion": "30.1.2", "obsWebSocketVersion": "5.4.2", "rpcVersion": 1});
        assert_eq!(describe_obs(&data), "OBS 30.1.2, obs-websocket 5.4.2");
        assert_eq!(describe_obs(&json!({})), "OBS ?, obs-websocket ?");
    }
}
