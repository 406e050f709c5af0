//! Stealth fingerprint profiles and the DOM-patching init script
//!
//! A profile is an internally consistent tuple of user agent, viewport,
//! locale, timezone and platform; one is drawn uniformly per browser
//! context. The companion script runs before any page script in every
//! frame and masks the usual automation tells. Each patch is wrapped so it
//! cannot throw when a property is already non-configurable, which also
//! makes the script idempotent.

use rand::seq::SliceRandom;
use rand::Rng;

/// One internally consistent browser fingerprint
#[derive(Debug, Clone, Copy)]
pub struct StealthProfile {
    pub user_agent: &'static str,
    pub viewport: (u32, u32),
    pub locale: &'static str,
    pub timezone: &'static str,
    /// Value reported by `navigator.platform`
    pub platform: &'static str,
    /// Client-Hints platform label (`Sec-CH-UA-Platform`)
    pub ch_platform: &'static str,
    /// Chrome major version embedded in the UA, for Client-Hints
    pub ua_major: u32,
    pub mobile: bool,
}

const PROFILES: &[StealthProfile] = &[
    StealthProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        viewport: (1920, 1080),
        locale: "en-US",
        timezone: "America/New_York",
        platform: "Win32",
        ch_platform: "Windows",
        ua_major: 131,
        mobile: false,
    },
    StealthProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        viewport: (1680, 1050),
        locale: "en-US",
        timezone: "America/Los_Angeles",
        platform: "MacIntel",
        ch_platform: "macOS",
        ua_major: 131,
        mobile: false,
    },
    StealthProfile {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
        viewport: (1920, 1080),
        locale: "en-GB",
        timezone: "Europe/London",
        platform: "Linux x86_64",
        ch_platform: "Linux",
        ua_major: 130,
        mobile: false,
    },
    StealthProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
        viewport: (1536, 864),
        locale: "en-US",
        timezone: "America/Chicago",
        platform: "Win32",
        ch_platform: "Windows",
        ua_major: 130,
        mobile: false,
    },
    StealthProfile {
        user_agent: "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Mobile Safari/537.36",
        viewport: (412, 915),
        locale: "en-US",
        timezone: "America/New_York",
        platform: "Linux armv81",
        ch_platform: "Android",
        ua_major: 131,
        mobile: true,
    },
];

/// WebGL vendor/renderer pairs for the `getParameter` patch
const WEBGL_IDENTITIES: &[(&str, &str)] = &[
    ("Intel Inc.", "Intel Iris OpenGL Engine"),
    ("Google Inc. (Intel)", "ANGLE (Intel, Intel(R) UHD Graphics 630, OpenGL 4.1)"),
    ("Google Inc. (NVIDIA)", "ANGLE (NVIDIA, NVIDIA GeForce GTX 1660 Direct3D11 vs_5_0 ps_5_0)"),
];

/// Pick one profile uniformly at random
pub fn random_profile() -> &'static StealthProfile {
    PROFILES
        .choose(&mut rand::thread_rng())
        .unwrap_or(&PROFILES[0])
}

/// Extra HTTP headers that agree with the profile's user agent
pub fn extra_headers(profile: &StealthProfile) -> Vec<(String, String)> {
    let sec_ch_ua = format!(
        "\"Chromium\";v=\"{major}\", \"Google Chrome\";v=\"{major}\", \"Not-A.Brand\";v=\"99\"",
        major = profile.ua_major
    );
    vec![
        (
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
                .to_string(),
        ),
        (
            "Accept-Language".to_string(),
            format!("{},en;q=0.9", profile.locale),
        ),
        ("DNT".to_string(), "1".to_string()),
        ("Upgrade-Insecure-Requests".to_string(), "1".to_string()),
        ("Sec-CH-UA".to_string(), sec_ch_ua),
        (
            "Sec-CH-UA-Mobile".to_string(),
            if profile.mobile { "?1" } else { "?0" }.to_string(),
        ),
        (
            "Sec-CH-UA-Platform".to_string(),
            format!("\"{}\"", profile.ch_platform),
        ),
    ]
}

/// Build the init script for a profile. Runs in every frame before any page
/// script; every patch is individually guarded so the script never throws.
pub fn build_init_script(profile: &StealthProfile) -> String {
    let mut rng = rand::thread_rng();
    // Plausible hardware: 4-16 logical cores, common memory tiers
    let cores = rng.gen_range(2..=8) * 2;
    let memory = [4u32, 8, 16].choose(&mut rng).copied().unwrap_or(8);
    let (webgl_vendor, webgl_renderer) = WEBGL_IDENTITIES
        .choose(&mut rng)
        .copied()
        .unwrap_or(WEBGL_IDENTITIES[0]);

    let languages = if profile.locale == "en-US" {
        "['en-US', 'en']"
    } else {
        "['en-GB', 'en']"
    };

    INIT_SCRIPT_TEMPLATE
        .replace("__PLATFORM__", profile.platform)
        .replace("__LANGUAGES__", languages)
        .replace("__CORES__", &cores.to_string())
        .replace("__MEMORY__", &memory.to_string())
        .replace("__WEBGL_VENDOR__", webgl_vendor)
        .replace("__WEBGL_RENDERER__", webgl_renderer)
}

const INIT_SCRIPT_TEMPLATE: &str = r#"
(() => {
  const patch = (obj, prop, getter) => {
    try {
      Object.defineProperty(obj, prop, { get: getter, configurable: true });
    } catch (e) { /* already non-configurable */ }
  };

  patch(navigator, 'webdriver', () => undefined);
  patch(navigator, 'platform', () => '__PLATFORM__');
  patch(navigator, 'hardwareConcurrency', () => __CORES__);
  patch(navigator, 'deviceMemory', () => __MEMORY__);
  patch(navigator, 'languages', () => __LANGUAGES__);

  try {
    if (!window.chrome) {
      window.chrome = {
        runtime: {},
        loadTimes: function () {},
        csi: function () {},
        app: { isInstalled: false },
      };
    }
  } catch (e) {}

  const makePluginArray = (items) => {
    const arr = items.slice();
    arr.item = (i) => arr[i] || null;
    arr.namedItem = (name) => arr.find((p) => p.name === name) || null;
    arr.refresh = () => {};
    arr[Symbol.iterator] = function* () { yield* items; };
    return arr;
  };

  const plugins = makePluginArray([
    { name: 'PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
    { name: 'Chrome PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
    { name: 'Chromium PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
  ]);
  const mimeTypes = makePluginArray([
    { type: 'application/pdf', suffixes: 'pdf', description: 'Portable Document Format' },
  ]);
  patch(navigator, 'plugins', () => plugins);
  patch(navigator, 'mimeTypes', () => mimeTypes);

  try {
    const getParameter = WebGLRenderingContext.prototype.getParameter;
    WebGLRenderingContext.prototype.getParameter = function (parameter) {
      if (parameter === 37445) return '__WEBGL_VENDOR__';
      if (parameter === 37446) return '__WEBGL_RENDERER__';
      return getParameter.call(this, parameter);
    };
  } catch (e) {}

  try {
    const originalQuery = window.navigator.permissions.query.bind(window.navigator.permissions);
    window.navigator.permissions.query = (parameters) =>
      parameters && parameters.name === 'notifications'
        ? Promise.resolve({ state: Notification.permission })
        : originalQuery(parameters);
  } catch (e) {}

  try {
    const descriptor = Object.getOwnPropertyDescriptor(HTMLIFrameElement.prototype, 'contentWindow');
    if (descriptor && descriptor.get) {
      Object.defineProperty(HTMLIFrameElement.prototype, 'contentWindow', {
        get: function () {
          const win = descriptor.get.call(this);
          try {
            if (win && !win.chrome) win.chrome = window.chrome;
          } catch (e) {}
          return win;
        },
        configurable: true,
      });
    }
  } catch (e) {}
})();
"#;
