#![forbid(unsafe_code)]

//! Support code for behavior with no single-expression Rust equivalent,
//! emitted once per unit as a private `ferrite_rt` module.

use std::collections::BTreeSet;

use ferrite_rir::RuntimeHelper;

pub(crate) fn emit_runtime(out: &mut String, helpers: &BTreeSet<RuntimeHelper>) {
    out.push_str("mod ferrite_rt {\n");
    for (i, helper) in helpers.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        match helper {
            RuntimeHelper::RoundHalfUp => emit_round_half_up(out),
            RuntimeHelper::Http => emit_http(out),
            RuntimeHelper::Split => emit_split(out),
            RuntimeHelper::MinMax => emit_min_max(out),
            RuntimeHelper::JsonText => emit_json_text(out),
        }
    }
    out.push_str("}\n");
}

fn emit_round_half_up(out: &mut String) {
    // Half-way values go toward positive infinity: -2.5 -> -2, 2.5 -> 3.
    out.push_str("    pub fn round_half_up(x: f64) -> f64 {\n");
    out.push_str("        let floor = x.floor();\n");
    out.push_str("        if x - floor >= 0.5 { floor + 1.0 } else { floor }\n");
    out.push_str("    }\n");
}

fn emit_split(out: &mut String) {
    // An empty separator yields one part per character, with no empty ends.
    out.push_str("    pub fn split(text: &str, separator: &str) -> Vec<String> {\n");
    out.push_str("        if separator.is_empty() {\n");
    out.push_str("            return text.chars().map(String::from).collect();\n");
    out.push_str("        }\n");
    out.push_str("        text.split(separator).map(String::from).collect()\n");
    out.push_str("    }\n");
}

fn emit_min_max(out: &mut String) {
    // `f64::max` and `f64::min` return the other operand when one is NaN.
    for name in ["max", "min"] {
        if name == "min" {
            out.push('\n');
        }
        out.push_str(&format!("    pub fn {name}(a: f64, b: f64) -> f64 {{\n"));
        out.push_str(&format!(
            "        if a.is_nan() || b.is_nan() {{ f64::NAN }} else {{ a.{name}(b) }}\n"
        ));
        out.push_str("    }\n");
    }
}

fn emit_json_text(out: &mut String) {
    // Text of an untyped value inside a template or a log line.
    out.push_str("    pub fn display(value: &serde_json::Value) -> String {\n");
    out.push_str("        match value {\n");
    out.push_str("            serde_json::Value::Null => \"null\".to_string(),\n");
    out.push_str("            serde_json::Value::Bool(b) => b.to_string(),\n");
    out.push_str("            serde_json::Value::Number(n) => match n.as_f64() {\n");
    out.push_str("                Some(x) => number(x),\n");
    out.push_str("                None => n.to_string(),\n");
    out.push_str("            },\n");
    out.push_str("            serde_json::Value::String(s) => s.clone(),\n");
    out.push_str("            serde_json::Value::Array(items) => items\n");
    out.push_str("                .iter()\n");
    out.push_str("                .map(|item| match item {\n");
    out.push_str("                    serde_json::Value::Null => String::new(),\n");
    out.push_str("                    other => display(other),\n");
    out.push_str("                })\n");
    out.push_str("                .collect::<Vec<_>>()\n");
    out.push_str("                .join(\",\"),\n");
    out.push_str("            serde_json::Value::Object(_) => \"[object Object]\".to_string(),\n");
    out.push_str("        }\n");
    out.push_str("    }\n\n");

    // JSON text with integral numbers written without a fraction.
    out.push_str("    pub fn stringify(value: serde_json::Value) -> String {\n");
    out.push_str("        integral(value).to_string()\n");
    out.push_str("    }\n\n");

    out.push_str("    fn number(x: f64) -> String {\n");
    out.push_str("        if x.is_infinite() {\n");
    out.push_str("            let sign = if x > 0.0 { \"\" } else { \"-\" };\n");
    out.push_str("            return format!(\"{sign}Infinity\");\n");
    out.push_str("        }\n");
    out.push_str("        if x == 0.0 { \"0\".to_string() } else { x.to_string() }\n");
    out.push_str("    }\n\n");

    out.push_str("    fn integral(value: serde_json::Value) -> serde_json::Value {\n");
    out.push_str("        match value {\n");
    out.push_str("            serde_json::Value::Number(n) => match n.as_f64() {\n");
    out.push_str("                Some(x) if x.fract() == 0.0 && x.abs() < 9.0e15 => {\n");
    out.push_str("                    serde_json::Value::from(x as i64)\n");
    out.push_str("                }\n");
    out.push_str("                _ => serde_json::Value::Number(n),\n");
    out.push_str("            },\n");
    out.push_str("            serde_json::Value::Array(items) => {\n");
    out.push_str("                let items = items.into_iter().map(integral).collect();\n");
    out.push_str("                serde_json::Value::Array(items)\n");
    out.push_str("            }\n");
    out.push_str("            serde_json::Value::Object(fields) => serde_json::Value::Object(\n");
    out.push_str("                fields.into_iter().map(|(k, v)| (k, integral(v))).collect(),\n");
    out.push_str("            ),\n");
    out.push_str("            other => other,\n");
    out.push_str("        }\n");
    out.push_str("    }\n");
}

fn emit_http(out: &mut String) {
    // Transport and decode failures panic: the source signatures carry no
    // error channel.
    out.push_str("    pub async fn http_request<T: serde::de::DeserializeOwned>(\n");
    out.push_str("        method: reqwest::Method,\n");
    out.push_str("        url: &str,\n");
    out.push_str("    ) -> T {\n");
    out.push_str("        let text = send(method.clone(), url, None).await;\n");
    out.push_str("        decode(&method, url, &text)\n");
    out.push_str("    }\n\n");

    out.push_str("    pub async fn http_request_with_body<\n");
    out.push_str("        T: serde::de::DeserializeOwned,\n");
    out.push_str("        B: serde::Serialize,\n");
    out.push_str("    >(\n");
    out.push_str("        method: reqwest::Method,\n");
    out.push_str("        url: &str,\n");
    out.push_str("        body: &B,\n");
    out.push_str("    ) -> T {\n");
    out.push_str("        let body = encode(&method, url, body);\n");
    out.push_str("        let text = send(method.clone(), url, Some(body)).await;\n");
    out.push_str("        decode(&method, url, &text)\n");
    out.push_str("    }\n\n");

    out.push_str("    pub async fn http_send(method: reqwest::Method, url: &str) {\n");
    out.push_str("        send(method, url, None).await;\n");
    out.push_str("    }\n\n");

    out.push_str("    pub async fn http_send_with_body<B: serde::Serialize>(\n");
    out.push_str("        method: reqwest::Method,\n");
    out.push_str("        url: &str,\n");
    out.push_str("        body: &B,\n");
    out.push_str("    ) {\n");
    out.push_str("        let body = encode(&method, url, body);\n");
    out.push_str("        send(method, url, Some(body)).await;\n");
    out.push_str("    }\n\n");

    out.push_str("    async fn send(\n");
    out.push_str("        method: reqwest::Method,\n");
    out.push_str("        url: &str,\n");
    out.push_str("        body: Option<serde_json::Value>,\n");
    out.push_str("    ) -> String {\n");
    out.push_str("        let client = reqwest::Client::new();\n");
    out.push_str("        let mut request = client.request(method.clone(), url);\n");
    out.push_str("        if let Some(body) = body {\n");
    out.push_str("            request = request.json(&body);\n");
    out.push_str("        }\n");
    out.push_str("        let response = request\n");
    out.push_str("            .send()\n");
    out.push_str("            .await\n");
    out.push_str("            .and_then(|r| r.error_for_status())\n");
    out.push_str("            .unwrap_or_else(|err| panic!(\"{method} {url} failed: {err}\"));\n");
    out.push_str("        response\n");
    out.push_str("            .text()\n");
    out.push_str("            .await\n");
    out.push_str("            .unwrap_or_else(|err| {\n");
    out.push_str("                panic!(\"{method} {url}: cannot read response: {err}\")\n");
    out.push_str("            })\n");
    out.push_str("    }\n\n");

    out.push_str("    fn encode<B: serde::Serialize>(\n");
    out.push_str("        method: &reqwest::Method,\n");
    out.push_str("        url: &str,\n");
    out.push_str("        body: &B,\n");
    out.push_str("    ) -> serde_json::Value {\n");
    out.push_str("        serde_json::to_value(body)\n");
    out.push_str("            .unwrap_or_else(|err| {\n");
    out.push_str("                panic!(\"{method} {url}: cannot encode body: {err}\")\n");
    out.push_str("            })\n");
    out.push_str("    }\n\n");

    // An empty body decodes as JSON `null`.
    out.push_str("    fn decode<T: serde::de::DeserializeOwned>(\n");
    out.push_str("        method: &reqwest::Method,\n");
    out.push_str("        url: &str,\n");
    out.push_str("        text: &str,\n");
    out.push_str("    ) -> T {\n");
    out.push_str("        let text = if text.trim().is_empty() { \"null\" } else { text };\n");
    out.push_str("        serde_json::from_str(text)\n");
    out.push_str("            .unwrap_or_else(|err| {\n");
    out.push_str("                panic!(\"{method} {url}: cannot decode response: {err}\")\n");
    out.push_str("            })\n");
    out.push_str("    }\n");
}
