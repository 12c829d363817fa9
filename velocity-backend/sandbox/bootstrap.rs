//! Toolchain files written into a fresh sandbox: a Vite + React + Tailwind
//! project whose dev server binds the exposed port.

use serde_json::json;

/// Path of the application component the generator overwrites.
pub const APP_COMPONENT_PATH: &str = "src/App.jsx";

/// Log file the detached dev server writes to.
pub const DEV_SERVER_LOG: &str = "/tmp/vite.log";

/// Hosting domains the dev server must accept in the `Host` header.
const ALLOWED_HOSTS: &[&str] = &[".vercel.run", ".e2b.dev", "localhost"];

pub struct ToolchainFile {
    pub path: &'static str,
    pub content: String,
}

fn package_json() -> String {
    let manifest = json!({
        "name": "sandbox-app",
        "version": "1.0.0",
        "type": "module",
        "scripts": {
            "dev": "vite --host",
            "build": "vite build",
            "preview": "vite preview"
        },
        "dependencies": {
            "react": "^18.2.0",
            "react-dom": "^18.2.0"
        },
        "devDependencies": {
            "@vitejs/plugin-react": "^4.0.0",
            "vite": "^4.3.9",
            "tailwindcss": "^3.3.0",
            "postcss": "^8.4.31",
            "autoprefixer": "^10.4.16"
        }
    });
    // A json! literal always serialises.
    serde_json::to_string_pretty(&manifest).unwrap_or_default()
}

fn vite_config(port: u16) -> String {
    let hosts = ALLOWED_HOSTS
        .iter()
        .map(|h| format!("      '{h}',"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"import {{ defineConfig }} from 'vite'
import react from '@vitejs/plugin-react'

export default defineConfig({{
  plugins: [react()],
  server: {{
    host: '0.0.0.0',
    port: {port},
    strictPort: true,
    allowedHosts: [
{hosts}
    ],
    hmr: {{
      clientPort: 443,
      protocol: 'wss'
    }}
  }}
}})
"#
    )
}

const TAILWIND_CONFIG: &str = r#"/** @type {import('tailwindcss').Config} */
export default {
  content: [
    "./index.html",
    "./src/**/*.{js,ts,jsx,tsx}",
  ],
  theme: {
    extend: {},
  },
  plugins: [],
}
"#;

const POSTCSS_CONFIG: &str = r#"export default {
  plugins: {
    tailwindcss: {},
    autoprefixer: {},
  },
}
"#;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>Velocity Preview</title>
  </head>
  <body>
    <div id="root"></div>
    <script type="module" src="/src/main.jsx"></script>
  </body>
</html>
"#;

const MAIN_JSX: &str = r#"import React from 'react'
import ReactDOM from 'react-dom/client'
import App from './App.jsx'
import './index.css'

ReactDOM.createRoot(document.getElementById('root')).render(
  <React.StrictMode>
    <App />
  </React.StrictMode>,
)
"#;

const PLACEHOLDER_APP: &str = r#"function App() {
  return (
    <div className="min-h-screen bg-gray-900 text-white flex items-center justify-center p-4">
      <p className="text-lg text-gray-400 text-center">
        Sandbox ready.<br />
        Your generated app will appear here.
      </p>
    </div>
  )
}

export default App
"#;

const INDEX_CSS: &str = r#"@tailwind base;
@tailwind components;
@tailwind utilities;

body {
  font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, sans-serif;
  background-color: rgb(17 24 39);
}
"#;

/// Every file the bootstrap writes, in write order.
pub fn toolchain_files(port: u16) -> Vec<ToolchainFile> {
    vec![
        ToolchainFile { path: "package.json", content: package_json() },
        ToolchainFile { path: "vite.config.js", content: vite_config(port) },
        ToolchainFile { path: "tailwind.config.js", content: TAILWIND_CONFIG.to_string() },
        ToolchainFile { path: "postcss.config.js", content: POSTCSS_CONFIG.to_string() },
        ToolchainFile { path: "index.html", content: INDEX_HTML.to_string() },
        ToolchainFile { path: "src/main.jsx", content: MAIN_JSX.to_string() },
        ToolchainFile { path: APP_COMPONENT_PATH, content: PLACEHOLDER_APP.to_string() },
        ToolchainFile { path: "src/index.css", content: INDEX_CSS.to_string() },
    ]
}

/// Shell script that kills any running dev server.
pub fn kill_dev_server_script() -> &'static str {
    "pkill -f vite || true"
}

/// Shell script that starts the dev server detached from the command.
pub fn start_dev_server_script() -> String {
    format!("nohup npm run dev > {DEV_SERVER_LOG} 2>&1 &")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::types::DEV_SERVER_PORT;

    #[test]
    fn writes_all_eight_files() {
        let files = toolchain_files(DEV_SERVER_PORT);
        let paths: Vec<&str> = files.iter().map(|f| f.path).collect();
        assert_eq!(
            paths,
            vec![
                "package.json",
                "vite.config.js",
                "tailwind.config.js",
                "postcss.config.js",
                "index.html",
                "src/main.jsx",
                "src/App.jsx",
                "src/index.css",
            ]
        );
    }

    #[test]
    fn package_json_is_valid_and_uses_vite() {
        let files = toolchain_files(DEV_SERVER_PORT);
        let manifest: serde_json::Value = serde_json::from_str(&files[0].content).unwrap();
        assert_eq!(manifest["name"], "sandbox-app");
        assert_eq!(manifest["scripts"]["dev"], "vite --host");
        assert_eq!(manifest["devDependencies"]["vite"], "^4.3.9");
    }

    #[test]
    fn vite_config_binds_port_and_allows_hosting_domains() {
        let cfg = vite_config(5173);
        assert!(cfg.contains("port: 5173,"));
        assert!(cfg.contains("strictPort: true"));
        assert!(cfg.contains("host: '0.0.0.0'"));
        for host in ALLOWED_HOSTS {
            assert!(cfg.contains(&format!("'{host}'")));
        }
    }

    #[test]
    fn dev_server_scripts() {
        assert_eq!(kill_dev_server_script(), "pkill -f vite || true");
        assert_eq!(start_dev_server_script(), "nohup npm run dev > /tmp/vite.log 2>&1 &");
    }
}
