use reqwest::{multipart, Client, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;

// Test client wrapper for making API calls
struct TestClient {
    client: Client,
    base_url: String,
    user_id: Option<String>,
}

impl TestClient {
    fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            user_id: None,
        }
    }

    fn as_user(&self, user_id: &str) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            user_id: Some(user_id.to_string()),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.user_id {
            Some(user_id) => builder.header("X-User-Id", user_id),
            None => builder,
        }
    }

    async fn post(&self, path: &str, json: Value) -> reqwest::Result<reqwest::Response> {
        self.request(reqwest::Method::POST, path).json(&json).send().await
    }

    async fn put(&self, path: &str, json: Value) -> reqwest::Result<reqwest::Response> {
        self.request(reqwest::Method::PUT, path).json(&json).send().await
    }

    async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.request(reqwest::Method::GET, path).send().await
    }

    async fn delete(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.request(reqwest::Method::DELETE, path).send().await
    }
}

/// Serves the app with in-memory stores on an ephemeral port
async fn spawn_server() -> TestClient {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let app = prodhub::app(prodhub::memory_services("https://store"), 10 * 1024 * 1024, None);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestClient::new(format!("http://{}", address))
}

async fn json_body(response: reqwest::Response) -> Value {
    response.json().await.unwrap()
}

#[tokio::test]
async fn test_repository_workflow() {
    let anonymous = spawn_server().await;

    let health = anonymous.get("/health").await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    // Step 1: create user u1
    let response = anonymous
        .post(
            "/user/create",
            json!({"username": "u1", "email": "a@x.com", "password": "secret1"}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let user = json_body(response).await;
    let user_id = user["user_id"].as_str().unwrap().to_string();
    assert!(user.get("password").is_none());

    let response = anonymous
        .post(
            "/user/create",
            json!({"username": "u1-again", "email": "a@x.com", "password": "secret1"}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["code"], "DUPLICATE_EMAIL");

    let response = anonymous
        .post("/auth/login", json!({"email": "a@x.com", "password": "secret1"}))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["user_id"], user_id.as_str());

    let response = anonymous
        .post("/auth/login", json!({"email": "a@x.com", "password": "wrong-password"}))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let client = anonymous.as_user(&user_id);

    // Step 2: create repository Beat1
    let response = client
        .post(
            "/repo/create",
            json!({"name": "Beat1", "bpm": 120, "scale": "C", "genre": "Lo-fi"}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let repo = json_body(response).await;
    let repo_id = repo["repoId"].as_str().unwrap().to_string();
    assert_eq!(repo["ownerId"], user_id.as_str());
    assert_eq!(repo["createdAt"], repo["updatedAt"]);
    let branches = repo["branches"].as_array().unwrap();
    assert_eq!(branches.len(), 1);
    assert_eq!(branches[0]["name"], "main");
    assert_eq!(branches[0]["versions"], json!([]));
    assert_eq!(branches[0]["activities"], json!([]));

    let owned = json_body(client.get(&format!("/user/{}", user_id)).await.unwrap()).await;
    assert_eq!(owned["repo_ids"], json!([repo_id]));

    let response = client
        .post(
            "/repo/create",
            json!({"name": "Too fast", "bpm": 301, "scale": "C", "genre": "DnB"}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "VALIDATION_ERROR");

    // Step 3: feature branch round trip
    let response = client
        .post(&format!("/repo/{}/branch", repo_id), json!({"name": "feature"}))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let feature = json_body(response).await;
    assert_eq!(feature["versions"], json!([]));
    assert_eq!(feature["isDefault"], false);

    let response = client
        .delete(&format!("/repo/{}/branch/feature", repo_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .get(&format!("/repo/{}/branch/feature", repo_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "BRANCH_NOT_FOUND");

    let response = client
        .delete(&format!("/repo/{}/branch/main", repo_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "PROTECTED_BRANCH");

    // Step 4: append a version to main by URL, then one by upload
    let response = client
        .post(
            &format!("/repo/{}/branch/main/version", repo_id),
            json!({"url": "https://store/x/file.wav", "changes": "initial mix"}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let first = json_body(response).await;
    assert_eq!(first["url"], "https://store/x/file.wav");
    assert_eq!(first["changes"], "initial mix");

    let form = multipart::Form::new().text("changes", "vocals").part(
        "file",
        multipart::Part::bytes(b"RIFF....WAVE".to_vec()).file_name("vocals.wav"),
    );
    let response = client
        .request(
            reqwest::Method::POST,
            &format!("/repo/{}/branch/main/version", repo_id),
        )
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let second = json_body(response).await;
    assert!(second["url"].as_str().unwrap().ends_with("/vocals.wav"));
    assert_ne!(first["versionId"], second["versionId"]);

    let main = json_body(
        client
            .get(&format!("/repo/{}/branch/main/switch", repo_id))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(main["versions"].as_array().unwrap().len(), 2);

    // Fork main and check the snapshot does not follow later appends
    let response = client
        .post(
            &format!("/repo/{}/branch", repo_id),
            json!({"name": "remix", "sourceBranch": "main"}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    client
        .post(
            &format!("/repo/{}/branch/main/version", repo_id),
            json!({"url": "https://store/x/third.wav", "changes": "third"}),
        )
        .await
        .unwrap();
    let remix = json_body(
        client
            .get(&format!("/repo/{}/branch/remix", repo_id))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(remix["versions"].as_array().unwrap().len(), 2);

    // Metadata and activity
    let response = client
        .put(&format!("/repo/{}", repo_id), json!({"public": true, "genre": "Jazz"}))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["description"]["genre"], "Jazz");

    let response = client
        .post(
            &format!("/repo/{}/activity", repo_id),
            json!({"description": "Mastered"}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let public = json_body(client.get("/repo/public").await.unwrap()).await;
    assert_eq!(public["total"], 1);

    // Likes
    let like_path = format!("/user/{}/repos/{}/like", user_id, repo_id);
    let response = client.post(&like_path, json!({})).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = client.post(&like_path, json!({})).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["code"], "ALREADY_LIKED");

    // Delete removes the document and the owner's reference
    let response = client.delete(&format!("/repo/{}", repo_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = json_body(response).await;
    assert_eq!(outcome["ledger_updated"], true);

    let response = client.get(&format!("/repo/{}", repo_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let repos = json_body(
        client
            .get(&format!("/user/{}/repos", user_id))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(repos["total"], 0);
}

#[tokio::test]
async fn test_unknown_owner_is_rejected() {
    let client = spawn_server().await.as_user("nobody");

    let response = client
        .post(
            "/repo/create",
            json!({"name": "Beat1", "bpm": 120, "scale": "C", "genre": "Lo-fi"}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["code"], "OWNER_NOT_FOUND");
    assert_eq!(body["partial"], false);

    let public = json_body(client.get("/repo/public").await.unwrap()).await;
    assert_eq!(public["total"], 0);
}

#[tokio::test]
async fn test_only_the_user_may_update_themselves() {
    let anonymous = spawn_server().await;
    let mut ids = Vec::new();
    for (name, email) in [("alice", "a@x.com"), ("bob", "b@x.com")] {
        let response = anonymous
            .post(
                "/user/create",
                json!({"username": name, "email": email, "password": "secret1"}),
            )
            .await
            .unwrap();
        ids.push(json_body(response).await["user_id"].as_str().unwrap().to_string());
    }

    let bob = anonymous.as_user(&ids[1]);
    let response = bob
        .put(&format!("/user/{}", ids[0]), json!({"username": "mallory"}))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = bob
        .put(&format!("/user/{}", ids[1]), json!({"username": "robert"}))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["username"], "robert");

    let response = anonymous.get(&format!("/user/{}", ids[0])).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
