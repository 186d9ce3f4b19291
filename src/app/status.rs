use tollgate::config::Config;
use tollgate::payment::SpendPolicyState;

pub fn render_status(config: &Config, policy: &SpendPolicyState) -> String {
    let mut lines = vec![
        "◆ Tollgate status".to_string(),
        String::new(),
        format!("  Version       {}", env!("CARGO_PKG_VERSION")),
        format!("  Config        {}", config.config_path.display()),
        format!("  State         {}", config.state_dir().display()),
        String::new(),
        format!("  Machine       {}", config.machine.default_url),
        format!(
            "  Resolver      {}",
            config
                .resolver
                .url
                .as_deref()
                .unwrap_or("(machine URL)")
        ),
        format!(
            "  Intent parser {}",
            config.intent.parser_url.as_deref().unwrap_or("keywords")
        ),
        format!("  Directory     {} machine(s)", config.machines.len()),
        String::new(),
    ];

    match (&config.wallet.wallet_rpc_url, &config.wallet.wallet_address) {
        (Some(url), Some(address)) => {
            lines.push(format!("  Wallet        {address} via {url}"));
            lines.push(format!(
                "  Chain         {} ({} RPC endpoint(s))",
                config.wallet.chain_id,
                config.wallet.rpc_urls.len()
            ));
        }
        _ => lines.push("  Wallet        not configured (payments refused)".to_string()),
    }

    lines.push(String::new());
    lines.extend(render_policy(policy));
    lines.push(format!(
        "  Per payment   {} max when autonomous",
        config.autonomy.max_auto_pay_amount
    ));
    lines.join("\n")
}

pub fn render_policy(policy: &SpendPolicyState) -> Vec<String> {
    vec![
        format!(
            "  Autonomy      {}",
            if policy.enabled { "enabled" } else { "disabled" }
        ),
        format!("  Daily limit   {}", policy.daily_limit),
        format!(
            "  Spent today   {} ({})",
            policy.daily_spent, policy.last_reset_date
        ),
        format!("  Remaining     {}", policy.remaining()),
    ]
}
