use std::sync::Arc;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::executor::Row;
use crate::llm::{AiRequestError, CompletionClient};

pub const ANSWER_SAMPLE_ROWS: usize = 5;

pub fn query_prompt(question: &str, schema: &str) -> String {
    format!("{schema}\nConvert to SQL (SELECT only): '{question}'")
}

pub fn answer_prompt(question: &str, rows: &[Row]) -> String {
    let sample = Value::Array(
        rows.iter()
            .take(ANSWER_SAMPLE_ROWS)
            .cloned()
            .map(Value::Object)
            .collect(),
    );
    format!("Data: {sample}\nQuestion: {question}\nAnswer in 2 lines, bold numbers:")
}

pub struct Synthesizer {
    llm: Arc<dyn CompletionClient>,
    opening_fence: Regex,
    sql_max_tokens: u32,
    answer_max_tokens: u32,
}

impl Synthesizer {
    pub fn new(
        llm: Arc<dyn CompletionClient>,
        sql_max_tokens: u32,
        answer_max_tokens: u32,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            llm,
            opening_fence: Regex::new(r"^```[ \t]*(?i:sql|postgresql|postgres|pgsql)?")?,
            sql_max_tokens,
            answer_max_tokens,
        })
    }

    pub fn clean_completion(&self, raw: &str) -> String {
        let text = self.opening_fence.replace(raw.trim(), "");
        let text = text.trim();
        let text = text.strip_suffix("```").unwrap_or(text);
        text.trim().trim_matches('`').trim().to_string()
    }

    pub async fn synthesize_query(
        &self,
        question: &str,
        schema: &str,
    ) -> Result<String, AiRequestError> {
        let prompt = query_prompt(question, schema);
        let raw = self.llm.complete(&prompt, self.sql_max_tokens).await?;
        if raw.trim().is_empty() {
            return Err(AiRequestError::EmptyCompletion);
        }
        let statement = self.clean_completion(&raw);
        debug!("Synthesized statement: {statement}");
        Ok(statement)
    }

    pub async fn synthesize_answer(
        &self,
        question: &str,
        rows: &[Row],
    ) -> Result<String, AiRequestError> {
        let prompt = answer_prompt(question, rows);
        let answer = self.llm.complete(&prompt, self.answer_max_tokens).await?;
        Ok(answer.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    struct Echo;

    #[async_trait]
    impl CompletionClient for Echo {
        async fn complete(&self, prompt: &str, _: u32) -> Result<String, AiRequestError> {
            Ok(prompt.to_string())
        }
    }

    fn synthesizer() -> Synthesizer {
        Synthesizer::new(Arc::new(Echo), 150, 100).unwrap()
    }

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn query_prompt_quotes_the_question_after_the_schema() {
        let prompt = query_prompt("how many customers in Austin", "Tables:\n- customers(phone)\n");
        assert_eq!(
            prompt,
            "Tables:\n- customers(phone)\n\nConvert to SQL (SELECT only): 'how many customers in Austin'"
        );
    }

    #[test]
    fn fences_are_stripped() {
        let synthesizer = synthesizer();
        for raw in [
            "SELECT 1",
            "  SELECT 1 \n",
            "`SELECT 1`",
            "```SELECT 1```",
            "```sql\nSELECT 1\n```",
            "```SQL\nSELECT 1```",
            "```postgresql\n  SELECT 1\n```\n",
        ] {
            assert_eq!(synthesizer.clean_completion(raw), "SELECT 1", "{raw:?}");
        }
    }

    #[test]
    fn statement_text_is_otherwise_verbatim() {
        let synthesizer = synthesizer();
        let raw = "```sql\nSELECT COUNT(*) FROM customers WHERE city='Austin';\n```";
        assert_eq!(
            synthesizer.clean_completion(raw),
            "SELECT COUNT(*) FROM customers WHERE city='Austin';"
        );
    }

    #[test]
    fn answer_prompt_keeps_only_the_first_five_rows() {
        let rows: Vec<Row> = (1..=8).map(|id| row(json!({ "order_id": id }))).collect();
        let prompt = answer_prompt("latest orders", &rows);
        for id in 1..=5 {
            assert!(prompt.contains(&format!("{{\"order_id\":{id}}}")), "{prompt}");
        }
        for id in 6..=8 {
            assert!(!prompt.contains(&format!("{{\"order_id\":{id}}}")), "{prompt}");
        }
    }

    #[test]
    fn answer_prompt_preserves_column_order() {
        let rows = vec![row(json!({ "phone": "555", "name": "Ada", "city": "Austin" }))];
        assert_eq!(
            answer_prompt("who", &rows),
            "Data: [{\"phone\":\"555\",\"name\":\"Ada\",\"city\":\"Austin\"}]\nQuestion: who\nAnswer in 2 lines, bold numbers:"
        );
    }

    #[tokio::test]
    async fn answers_are_trimmed() {
        struct Padded;

        #[async_trait]
        impl CompletionClient for Padded {
            async fn complete(&self, _: &str, _: u32) -> Result<String, AiRequestError> {
                Ok("\n  There are **42** customers.  \n".into())
            }
        }

        let synthesizer = Synthesizer::new(Arc::new(Padded), 150, 100).unwrap();
        let answer = synthesizer.synthesize_answer("q", &[]).await.unwrap();
        assert_eq!(answer, "There are **42** customers.");
    }

    struct Blank;

    #[async_trait]
    impl CompletionClient for Blank {
        async fn complete(&self, _: &str, _: u32) -> Result<String, AiRequestError> {
            Ok(" \n ".into())
        }
    }

    #[tokio::test]
    async fn blank_sql_completion_is_an_error() {
        let synthesizer = Synthesizer::new(Arc::new(Blank), 150, 100).unwrap();
        let err = synthesizer.synthesize_query("q", "Tables:\n").await.unwrap_err();
        assert!(matches!(err, AiRequestError::EmptyCompletion));
    }

    #[tokio::test]
    async fn blank_answer_is_returned_trimmed() {
        let synthesizer = Synthesizer::new(Arc::new(Blank), 150, 100).unwrap();
        let answer = synthesizer.synthesize_answer("q", &[]).await.unwrap();
        assert_eq!(answer, "");
    }
}
