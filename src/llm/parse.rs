//! 模型输出解析辅助：从文本中提取 JSON 块

/// 提取 JSON 对象：优先 ```json 代码块，其次第一个 '{' 到最后一个 '}'；无则 None
pub fn extract_json_block(output: &str) -> Option<&str> {
    let trimmed = output.trim();

    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let block = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        return Some(block.trim());
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&trimmed[start..=end])
}
