//! Reverse-proxy provisioning for browser-based multisig coordinators.

use regpack_common::SharedConfig;

/// Render the nginx config fronting the node's RPC port.
///
/// The coordinator runs in a browser and cannot send RPC basic-auth
/// preflights cross-origin, so the proxy adds the CORS headers.
pub fn render_nginx_conf(config: &SharedConfig) -> String {
    let mut conf = String::new();

    conf.push_str("# Generated by regpack; regenerated on every proxy setup.\n");
    conf.push_str("server {\n");
    conf.push_str("    listen 80;\n\n");
    conf.push_str("    location / {\n");
    conf.push_str(&format!(
        "        proxy_pass http://{}:{};\n",
        config.container.container_name, config.rpc.rpc_port
    ));
    conf.push_str("        proxy_set_header Host $host;\n\n");
    conf.push_str("        add_header Access-Control-Allow-Origin * always;\n");
    conf.push_str(
        "        add_header Access-Control-Allow-Headers 'Authorization, Content-Type' always;\n",
    );
    conf.push_str("        add_header Access-Control-Allow-Methods 'POST, OPTIONS' always;\n\n");
    conf.push_str("        if ($request_method = OPTIONS) {\n");
    conf.push_str("            return 204;\n");
    conf.push_str("        }\n");
    conf.push_str("    }\n");
    conf.push_str("}\n");

    conf
}
