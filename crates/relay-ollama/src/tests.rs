//! HTTP and snapshot tests for the Ollama client

#[cfg(test)]
mod client_tests {
    use crate::{EmbeddingProvider, Error, GenerationProvider, OllamaClient, OllamaConfig, Stage};
    use futures::TryStreamExt;
    use insta::assert_yaml_snapshot;
    use mockito::Matcher;
    use serde_json::json;
    use std::collections::HashMap;

    fn client_for(server: &mockito::ServerGuard) -> OllamaClient {
        OllamaClient::new(OllamaConfig::new(server.url())).unwrap()
    }

    #[test]
    fn test_config_snapshot() {
        let config = OllamaConfig::new("http://ollama:11434");

        assert_yaml_snapshot!(config, @r###"
        base_url: "http://ollama:11434"
        embedding_model: nomic-embed-text
        generation_model: llama3
        connect_timeout_secs: 10
        "###);
    }

    #[test]
    fn test_config_from_lookup() {
        let vars = HashMap::from([
            ("OLLAMA_URL", "http://gpu-box:11434"),
            ("OLLAMA_GENERATE_MODEL", "mistral"),
            ("OLLAMA_CONNECT_TIMEOUT_SECS", "3"),
        ]);
        let config =
            OllamaConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.base_url, "http://gpu-box:11434");
        assert_eq!(config.embedding_model, OllamaClient::NOMIC_EMBED_TEXT);
        assert_eq!(config.generation_model, "mistral");
        assert_eq!(config.connect_timeout_secs, 3);

        let bad_timeout = OllamaConfig::from_lookup(|key| {
            (key == "OLLAMA_CONNECT_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert!(matches!(bad_timeout, Err(Error::Configuration(_))));

        let bad_url =
            OllamaConfig::from_lookup(|key| (key == "OLLAMA_URL").then(|| "ollama:11434".to_string()));
        assert!(matches!(bad_url, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_embed_sends_model_and_prompt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/embeddings")
            .match_body(Matcher::Json(json!({
                "model": "nomic-embed-text",
                "prompt": "Paris is the capital of France.",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"embedding":[0.5,0.25,-0.125]}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let embedding = client.embed("Paris is the capital of France.").await.unwrap();

        mock.assert_async().await;
        assert_eq!(embedding, vec![0.5, 0.25, -0.125]);
    }

    #[tokio::test]
    async fn test_embed_surfaces_upstream_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/embeddings")
            .with_status(500)
            .with_body("model 'nomic-embed-text' not found")
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.embed("anything").await.unwrap_err();

        mock.assert_async().await;
        match err {
            Error::Upstream { stage, status, body } => {
                assert_eq!(stage, Stage::Embedding);
                assert_eq!(status, 500);
                assert_eq!(body, "model 'nomic-embed-text' not found");
            }
            other => panic!("expected upstream error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_embed_rejects_missing_field() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/embeddings")
            .with_status(200)
            .with_body(r#"{"embeddings":[[0.1]]}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.embed("anything").await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidResponse { stage: Stage::Embedding, .. }
        ));
    }

    #[tokio::test]
    async fn test_embed_network_failure() {
        let client = OllamaClient::new(OllamaConfig::new("http://127.0.0.1:1")).unwrap();
        let err = client.embed("anything").await.unwrap_err();
        assert!(matches!(err, Error::Network { stage: Stage::Embedding, .. }));
    }

    #[tokio::test]
    async fn test_generate_stream_returns_raw_body() {
        let body = "{\"response\":\"Paris\"}\n{\"response\":\".\"}\n{\"done\":true}\n";
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(json!({
                "model": "llama3",
                "stream": true,
            })))
            .with_status(200)
            .with_header("content-type", "application/x-ndjson")
            .with_body(body)
            .create_async()
            .await;

        let client = client_for(&server);
        let fragments: Vec<_> = client
            .generate_stream("Answer using context only:\n\n\nQuestion: hi")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        mock.assert_async().await;
        let joined: Vec<u8> = fragments.iter().flat_map(|b| b.iter().copied()).collect();
        assert_eq!(String::from_utf8(joined).unwrap(), body);
    }

    #[tokio::test]
    async fn test_generate_stream_failure_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let client = client_for(&server);
        let err = match client.generate_stream("prompt").await {
            Ok(_) => panic!("expected the generation request to fail"),
            Err(e) => e,
        };
        assert!(matches!(
            err,
            Error::Upstream { stage: Stage::Generation, status: 503, .. }
        ));
    }

    #[test]
    fn test_model_ids() {
        let client = OllamaClient::new(OllamaConfig::default()).unwrap();
        assert_eq!(EmbeddingProvider::model_id(&client), OllamaClient::NOMIC_EMBED_TEXT);
        assert_eq!(GenerationProvider::model_id(&client), OllamaClient::LLAMA3);
    }
}
