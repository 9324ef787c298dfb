//! Integration tests for the chat pipeline stage ordering and failure modes

use async_trait::async_trait;
use ragflow_core::{
    ChatPipeline, ChatService, ChatTurn, Completion, CompletionModel, Embedder, PromptTemplate,
    RagFlowError, RenderedPrompt, Result, RetrievedDocument, Retriever, TokenUsage,
};
use std::sync::{Arc, Mutex};

type CallLog = Arc<Mutex<Vec<String>>>;

struct MockEmbedder {
    calls: CallLog,
    fail: bool,
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.lock().unwrap().push("embed".into());
        if self.fail {
            return Err(RagFlowError::Embedding("embedding service down".into()));
        }
        Ok(vec![0.1, 0.2, 0.3])
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }
}

struct MockRetriever {
    calls: CallLog,
    documents: Vec<RetrievedDocument>,
    fail: bool,
}

#[async_trait]
impl Retriever for MockRetriever {
    async fn retrieve(
        &self,
        _question: &str,
        _embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        self.calls.lock().unwrap().push(format!("retrieve(top_k={top_k})"));
        if self.fail {
            return Err(RagFlowError::Retrieval("transient upstream failure".into()));
        }
        Ok(self.documents.clone())
    }
}

struct MockCompletion {
    calls: CallLog,
}

#[async_trait]
impl CompletionModel for MockCompletion {
    async fn complete(&self, prompt: &RenderedPrompt) -> Result<Completion> {
        self.calls.lock().unwrap().push("complete".into());
        assert!(!prompt.user.is_empty());
        Ok(Completion {
            answer: "You can request records through the member portal.".into(),
            usage: TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 20,
                total_tokens: 120,
            },
        })
    }

    fn deployment(&self) -> &str {
        "mock-chat"
    }
}

fn doc(id: &str, title: &str) -> RetrievedDocument {
    RetrievedDocument {
        id: id.to_string(),
        title: title.to_string(),
        content: format!("{title} content"),
        url: format!("https://docs.example/{id}"),
    }
}

fn pipeline(
    calls: &CallLog,
    documents: Vec<RetrievedDocument>,
    embed_fails: bool,
    retrieve_fails: bool,
) -> ChatPipeline {
    ChatPipeline::new(
        Arc::new(MockEmbedder {
            calls: calls.clone(),
            fail: embed_fails,
        }),
        Arc::new(MockRetriever {
            calls: calls.clone(),
            documents,
            fail: retrieve_fails,
        }),
        PromptTemplate::default_chat().unwrap(),
        Arc::new(MockCompletion {
            calls: calls.clone(),
        }),
    )
}

#[tokio::test]
async fn stages_run_once_each_in_order() {
    let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
    let docs = vec![doc("1", "Records"), doc("2", "Portal"), doc("3", "Privacy")];
    let p = pipeline(&calls, docs, false, false);

    let response = p
        .answer("How can I access my medical records?", &[])
        .await
        .unwrap();

    assert_eq!(
        *calls.lock().unwrap(),
        vec!["embed", "retrieve(top_k=3)", "complete"]
    );
    assert!(!response.answer.is_empty());
    assert_eq!(response.context.len(), 3);
}

#[tokio::test]
async fn context_preserves_retriever_order() {
    let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
    // Deliberately not alphabetical or by id: the service ranking wins.
    let docs = vec![doc("9", "Zeta"), doc("2", "Alpha"), doc("5", "Mid")];
    let p = pipeline(&calls, docs.clone(), false, false);

    let response = p.answer("anything", &[]).await.unwrap();
    assert_eq!(response.context, docs);
}

#[tokio::test]
async fn empty_retrieval_still_completes() {
    let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
    let p = pipeline(&calls, vec![], false, false);

    let response = p.answer("obscure question", &[]).await.unwrap();
    assert!(response.context.is_empty());
    assert!(!response.answer.is_empty());
    assert_eq!(
        *calls.lock().unwrap(),
        vec!["embed", "retrieve(top_k=3)", "complete"]
    );
}

#[tokio::test]
async fn retriever_failure_skips_later_stages() {
    let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
    let p = pipeline(&calls, vec![], false, true);

    let err = p.answer("q", &[]).await.unwrap_err();
    assert!(matches!(err, RagFlowError::Retrieval(_)));
    assert_eq!(*calls.lock().unwrap(), vec!["embed", "retrieve(top_k=3)"]);
}

#[tokio::test]
async fn embedder_failure_stops_immediately() {
    let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
    let p = pipeline(&calls, vec![], true, false);

    let err = p.answer("q", &[]).await.unwrap_err();
    assert!(matches!(err, RagFlowError::Embedding(_)));
    assert_eq!(*calls.lock().unwrap(), vec!["embed"]);
}

#[tokio::test]
async fn history_flows_into_prompt() {
    let calls: CallLog = Arc::new(Mutex::new(Vec::new()));

    struct HistoryCheckingCompletion;

    #[async_trait]
    impl CompletionModel for HistoryCheckingCompletion {
        async fn complete(&self, prompt: &RenderedPrompt) -> Result<Completion> {
            assert!(prompt.user.contains("earlier question"));
            Ok(Completion {
                answer: "ok".into(),
                usage: TokenUsage::default(),
            })
        }

        fn deployment(&self) -> &str {
            "mock-chat"
        }
    }

    let p = ChatPipeline::new(
        Arc::new(MockEmbedder {
            calls: calls.clone(),
            fail: false,
        }),
        Arc::new(MockRetriever {
            calls: calls.clone(),
            documents: vec![],
            fail: false,
        }),
        PromptTemplate::default_chat().unwrap(),
        Arc::new(HistoryCheckingCompletion),
    );

    let history = vec![ChatTurn {
        question: "earlier question".into(),
        answer: "earlier answer".into(),
    }];
    p.answer("follow-up", &history).await.unwrap();
}
