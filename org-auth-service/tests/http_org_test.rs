//! Organization and team endpoints over HTTP.

mod common;

use axum::http::{Method, StatusCode};
use common::{BrowserSession, TestApp, PASSWORD};
use serde_json::json;

async fn signed_up(app: &TestApp, email: &str) -> BrowserSession {
    app.register(email).await;
    app.http_login(email, PASSWORD).await
}

/// Invite `invitee` into `org` with `role` and accept over HTTP.
async fn invite_and_accept(
    app: &TestApp,
    inviter: &BrowserSession,
    invitee: &BrowserSession,
    email: &str,
    org: &str,
    role: &str,
) {
    let invited = app
        .send(inviter.request(
            Method::POST,
            &format!("/organizations/{}/invitations", org),
            Some(json!({ "email": email, "role": role })),
        ))
        .await;
    assert_eq!(invited.status, StatusCode::CREATED, "{}", invited.body);
    assert_eq!(invited.body["invitation"]["role"], role);
    let token = invited.body["token"].as_str().unwrap().to_string();

    let accepted = app
        .send(invitee.request(
            Method::POST,
            "/invitations/accept",
            Some(json!({ "token": token })),
        ))
        .await;
    assert_eq!(accepted.status, StatusCode::OK, "{}", accepted.body);
    assert_eq!(accepted.body["status"], "ACTIVE");
}

#[tokio::test]
async fn admin_is_forbidden_from_changing_the_owner() {
    let app = TestApp::spawn().await;
    let alice = signed_up(&app, "alice@example.com").await;
    let bob = signed_up(&app, "bob@example.com").await;

    let created = app
        .send(alice.request(
            Method::POST,
            "/organizations",
            Some(json!({ "name": "Acme" })),
        ))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let org = created.body["id"].as_str().unwrap().to_string();

    invite_and_accept(&app, &alice, &bob, "bob@example.com", &org, "MEMBER").await;

    let promoted = app
        .send(alice.request(
            Method::PATCH,
            &format!("/organizations/{}/members/{}", org, bob.account_id),
            Some(json!({ "role": "ADMIN" })),
        ))
        .await;
    assert_eq!(promoted.status, StatusCode::OK);
    assert_eq!(promoted.body["role"], "ADMIN");

    let demote_owner = app
        .send(bob.request(
            Method::PATCH,
            &format!("/organizations/{}/members/{}", org, alice.account_id),
            Some(json!({ "role": "MEMBER" })),
        ))
        .await;
    assert_eq!(demote_owner.status, StatusCode::FORBIDDEN);

    let remove_owner = app
        .send(bob.request(
            Method::DELETE,
            &format!("/organizations/{}/members/{}", org, alice.account_id),
            None,
        ))
        .await;
    assert_eq!(remove_owner.status, StatusCode::FORBIDDEN);

    let delete_org = app
        .send(bob.request(Method::DELETE, &format!("/organizations/{}", org), None))
        .await;
    assert_eq!(delete_org.status, StatusCode::FORBIDDEN);

    let members = app
        .send(bob.request(
            Method::GET,
            &format!("/organizations/{}/members", org),
            None,
        ))
        .await;
    assert_eq!(members.status, StatusCode::OK);
    let owners = members
        .body
        .as_array()
        .unwrap()
        .iter()
        .filter(|m| m["role"] == "OWNER")
        .count();
    assert_eq!(owners, 1);
}

#[tokio::test]
async fn mutations_require_csrf_header() {
    let app = TestApp::spawn().await;
    let alice = signed_up(&app, "alice@example.com").await;

    let mut request = alice.request(
        Method::POST,
        "/organizations",
        Some(json!({ "name": "Acme" })),
    );
    request.headers_mut().remove("x-csrf-token");
    let res = app.send(request).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["error"], "Invalid CSRF token");

    // safe methods pass without it
    let mut request = alice.request(Method::GET, "/organizations", None);
    request.headers_mut().remove("x-csrf-token");
    let res = app.send(request).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, json!([]));
}

#[tokio::test]
async fn organization_crud_round() {
    let app = TestApp::spawn().await;
    let alice = signed_up(&app, "alice@example.com").await;

    let blank = app
        .send(alice.request(
            Method::POST,
            "/organizations",
            Some(json!({ "name": "" })),
        ))
        .await;
    assert_eq!(blank.status, StatusCode::UNPROCESSABLE_ENTITY);

    let created = app
        .send(alice.request(
            Method::POST,
            "/organizations",
            Some(json!({ "name": "Acme", "description": "Widgets" })),
        ))
        .await;
    let org = created.body["id"].as_str().unwrap().to_string();
    assert_eq!(created.body["createdBy"], alice.account_id.to_string());

    let cleared = app
        .send(alice.request(
            Method::PATCH,
            &format!("/organizations/{}", org),
            Some(json!({ "description": null })),
        ))
        .await;
    assert_eq!(cleared.status, StatusCode::OK);
    assert_eq!(cleared.body["name"], "Acme");
    assert!(cleared.body["description"].is_null());

    let deleted = app
        .send(alice.request(Method::DELETE, &format!("/organizations/{}", org), None))
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    let gone = app
        .send(alice.request(Method::GET, &format!("/organizations/{}", org), None))
        .await;
    // memberships went with it
    assert_eq!(gone.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn team_leader_edits_while_admin_is_forbidden() {
    let app = TestApp::spawn().await;
    let owner = signed_up(&app, "owner@example.com").await;
    let admin = signed_up(&app, "admin@example.com").await;
    let lead = signed_up(&app, "lead@example.com").await;

    let org = app
        .send(owner.request(
            Method::POST,
            "/organizations",
            Some(json!({ "name": "Acme" })),
        ))
        .await
        .body["id"]
        .as_str()
        .unwrap()
        .to_string();
    invite_and_accept(&app, &owner, &admin, "admin@example.com", &org, "ADMIN").await;
    invite_and_accept(&app, &owner, &lead, "lead@example.com", &org, "TEAM_LEAD").await;

    let created = app
        .send(lead.request(
            Method::POST,
            &format!("/organizations/{}/teams", org),
            Some(json!({ "name": "Core" })),
        ))
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    assert_eq!(created.body["leaderId"], lead.account_id.to_string());
    let team = created.body["id"].as_str().unwrap().to_string();
    let team_path = format!("/organizations/{}/teams/{}", org, team);

    let by_admin = app
        .send(admin.request(
            Method::PATCH,
            &team_path,
            Some(json!({ "name": "Hijacked" })),
        ))
        .await;
    assert_eq!(by_admin.status, StatusCode::FORBIDDEN);

    let by_lead = app
        .send(lead.request(
            Method::PATCH,
            &team_path,
            Some(json!({ "name": "Core Platform" })),
        ))
        .await;
    assert_eq!(by_lead.status, StatusCode::OK);
    assert_eq!(by_lead.body["name"], "Core Platform");

    let added = app
        .send(lead.request(
            Method::POST,
            &format!("{}/members", team_path),
            Some(json!({ "userId": admin.account_id })),
        ))
        .await;
    assert_eq!(added.status, StatusCode::CREATED);

    let members = app
        .send(owner.request(Method::GET, &format!("{}/members", team_path), None))
        .await;
    assert_eq!(members.body.as_array().unwrap().len(), 2);

    let handover = app
        .send(lead.request(
            Method::POST,
            &format!("{}/leader", team_path),
            Some(json!({ "leaderId": admin.account_id })),
        ))
        .await;
    assert_eq!(handover.status, StatusCode::FORBIDDEN);

    let handover = app
        .send(admin.request(
            Method::POST,
            &format!("{}/leader", team_path),
            Some(json!({ "leaderId": admin.account_id })),
        ))
        .await;
    assert_eq!(handover.status, StatusCode::OK);
    assert_eq!(handover.body["leaderId"], admin.account_id.to_string());
}

#[tokio::test]
async fn team_path_must_match_its_organization() {
    let app = TestApp::spawn().await;
    let alice = signed_up(&app, "alice@example.com").await;

    let mut orgs = Vec::new();
    for name in ["First", "Second"] {
        let res = app
            .send(alice.request(
                Method::POST,
                "/organizations",
                Some(json!({ "name": name })),
            ))
            .await;
        orgs.push(res.body["id"].as_str().unwrap().to_string());
    }

    let team = app
        .send(alice.request(
            Method::POST,
            &format!("/organizations/{}/teams", orgs[0]),
            Some(json!({ "name": "Core" })),
        ))
        .await
        .body["id"]
        .as_str()
        .unwrap()
        .to_string();

    let ok = app
        .send(alice.request(
            Method::GET,
            &format!("/organizations/{}/teams/{}", orgs[0], team),
            None,
        ))
        .await;
    assert_eq!(ok.status, StatusCode::OK);

    let mismatched = app
        .send(alice.request(
            Method::GET,
            &format!("/organizations/{}/teams/{}", orgs[1], team),
            None,
        ))
        .await;
    assert_eq!(mismatched.status, StatusCode::NOT_FOUND);

    let listed = app
        .send(alice.request(
            Method::GET,
            &format!("/organizations/{}/teams", orgs[1]),
            None,
        ))
        .await;
    assert_eq!(listed.body, json!([]));
}

#[tokio::test]
async fn outsider_cannot_reach_a_team_through_their_own_organization() {
    let app = TestApp::spawn().await;
    let alice = signed_up(&app, "alice@example.com").await;
    let eve = signed_up(&app, "eve@example.com").await;

    let mut orgs = Vec::new();
    for (session, name) in [(&alice, "Acme"), (&eve, "Elsewhere")] {
        let res = app
            .send(session.request(
                Method::POST,
                "/organizations",
                Some(json!({ "name": name })),
            ))
            .await;
        orgs.push(res.body["id"].as_str().unwrap().to_string());
    }
    let team = app
        .send(alice.request(
            Method::POST,
            &format!("/organizations/{}/teams", orgs[0]),
            Some(json!({ "name": "Core" })),
        ))
        .await
        .body["id"]
        .as_str()
        .unwrap()
        .to_string();

    let foreign = format!("/organizations/{}/teams/{}", orgs[1], team);
    for path in [foreign.clone(), format!("{}/members", foreign)] {
        let res = app.send(eve.request(Method::GET, &path, None)).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND, "{}", path);
        assert_eq!(res.body["error"], "Team not found");
    }

    let renamed = app
        .send(eve.request(Method::PATCH, &foreign, Some(json!({ "name": "Mine" }))))
        .await;
    assert_eq!(renamed.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_members_cannot_read_an_organization() {
    let app = TestApp::spawn().await;
    let alice = signed_up(&app, "alice@example.com").await;
    let eve = signed_up(&app, "eve@example.com").await;

    let org = app
        .send(alice.request(
            Method::POST,
            "/organizations",
            Some(json!({ "name": "Acme" })),
        ))
        .await
        .body["id"]
        .as_str()
        .unwrap()
        .to_string();

    let res = app
        .send(eve.request(Method::GET, &format!("/organizations/{}", org), None))
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.body["error"], "not a member");

    let invalid_id = app
        .send(eve.request(Method::GET, "/organizations/not-a-uuid", None))
        .await;
    assert_eq!(invalid_id.status, StatusCode::BAD_REQUEST);
}
