mod util;

use cakit::engine::Engine;
use cakit::model::{Certificate, Subject};
use cakit::store::MemoryStore;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{CrlStatus, X509, X509Crl, X509StoreContext, X509VerifyResult};
use tokio_util::sync::CancellationToken;

async fn x509(engine: &Engine<MemoryStore>, cert: &Certificate) -> X509 {
    let pem = engine
        .get_public_cert(cert.id, &CancellationToken::new())
        .await
        .unwrap();
    X509::from_pem(pem.as_bytes()).expect("Failed to parse PEM")
}

fn entry(x509: &X509, nid: Nid) -> String {
    x509.subject_name()
        .entries_by_nid(nid)
        .next()
        .unwrap()
        .data()
        .as_utf8()
        .unwrap()
        .to_string()
}

/// Root, intermediate CA and a server certificate under it.
async fn hierarchy(engine: &Engine<MemoryStore>) -> (Certificate, Certificate, Certificate) {
    let root = util::create(engine, util::root("myca.local", 365)).await;
    let intermediate = util::create(
        engine,
        Subject::builder()
            .name("intermediate.myca.local")
            .days(180)
            .issuer(root.id)
            .ca(true)
            .build(),
    )
    .await;
    let server = util::create(
        engine,
        Subject::builder()
            .name("server.myca.local")
            .days(30)
            .issuer(intermediate.id)
            .domains(vec!["server.myca.local".into(), "api.myca.local".into()])
            .units(vec!["platform".into()])
            .ips(vec!["10.0.0.10".into()])
            .build(),
    )
    .await;
    (root, intermediate, server)
}

#[tokio::test]
async fn test_openssl_crate_reads_issued_cert() {
    let engine = util::engine();
    let (_, intermediate, server) = hierarchy(&engine).await;
    let cert = x509(&engine, &server).await;

    assert_eq!(entry(&cert, Nid::COMMONNAME), "server.myca.local");
    assert_eq!(entry(&cert, Nid::ORGANIZATIONALUNITNAME), server.id.to_string());
    assert_eq!(entry(&cert, Nid::SERIALNUMBER), server.serial);

    let issuer = cert
        .issuer_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .unwrap()
        .data()
        .as_utf8()
        .unwrap();
    assert_eq!(issuer.to_string(), intermediate.name);

    assert_eq!(cert.version(), 2, "X509 version should be 3 (0-based index)");

    let serial = cert.serial_number().to_bn().unwrap().to_dec_str().unwrap();
    assert_eq!(serial.to_string(), server.serial);

    assert_eq!(
        cert.signature_algorithm().object().nid(),
        Nid::SHA256WITHRSAENCRYPTION,
        "Signature algorithm should be sha256WithRSAEncryption"
    );

    let names = cert.subject_alt_names().expect("missing subject alt names");
    let dns: Vec<&str> = names.iter().filter_map(|name| name.dnsname()).collect();
    let ips: Vec<&[u8]> = names.iter().filter_map(|name| name.ipaddress()).collect();
    assert_eq!(dns, vec!["server.myca.local", "api.myca.local"]);
    assert_eq!(ips, vec![&[10u8, 0, 0, 10][..]]);
}

#[tokio::test]
async fn test_openssl_private_key_matches_cert() {
    let engine = util::engine();
    let (_, _, server) = hierarchy(&engine).await;
    let cert = x509(&engine, &server).await;

    let key_pem = engine
        .get_private_key(server.id, &CancellationToken::new())
        .await
        .unwrap();
    let key = PKey::from_rsa(Rsa::private_key_from_pem(key_pem.as_bytes()).unwrap()).unwrap();
    assert!(cert.public_key().unwrap().public_eq(&key));
}

#[tokio::test]
async fn test_openssl_verifies_chain() {
    let engine = util::engine();
    let (root, intermediate, server) = hierarchy(&engine).await;
    let root = x509(&engine, &root).await;
    let intermediate = x509(&engine, &intermediate).await;
    let server = x509(&engine, &server).await;

    assert_eq!(root.issued(&intermediate), X509VerifyResult::OK);
    assert_eq!(intermediate.issued(&server), X509VerifyResult::OK);
    assert_ne!(root.issued(&server), X509VerifyResult::OK);
    assert!(server.verify(&intermediate.public_key().unwrap()).unwrap());

    let mut store = X509StoreBuilder::new().unwrap();
    store.add_cert(root).unwrap();
    let store = store.build();

    let mut chain = Stack::new().unwrap();
    chain.push(intermediate).unwrap();

    let mut context = X509StoreContext::new().unwrap();
    let verified = context
        .init(&store, &server, &chain, |c| {
            let ok = c.verify_cert()?;
            assert_eq!(c.error(), X509VerifyResult::OK, "{}", c.error());
            Ok(ok)
        })
        .unwrap();
    assert!(verified);
}

#[tokio::test]
async fn test_openssl_verifies_renewed_chain() {
    let engine = util::engine();
    let cancel = CancellationToken::new();
    let (root, intermediate, server) = hierarchy(&engine).await;
    let old_root = x509(&engine, &root).await;

    engine
        .renew_certificate(
            root.id,
            cakit::model::Renewal::builder().days(730).build(),
            &cancel,
        )
        .await
        .unwrap();

    let root = x509(&engine, &root).await;
    let intermediate = x509(&engine, &intermediate).await;
    let server = x509(&engine, &server).await;

    assert_ne!(old_root.issued(&intermediate), X509VerifyResult::OK);
    assert_eq!(root.issued(&intermediate), X509VerifyResult::OK);
    assert_eq!(intermediate.issued(&server), X509VerifyResult::OK);
    assert!(intermediate.verify(&root.public_key().unwrap()).unwrap());
    assert!(server.verify(&intermediate.public_key().unwrap()).unwrap());
}

#[tokio::test]
async fn test_openssl_reads_revocation_list() {
    let engine = util::engine();
    let cancel = CancellationToken::new();
    let (root, intermediate, server) = hierarchy(&engine).await;
    let other = util::create(&engine, util::issued("other.myca.local", 30, intermediate.id)).await;
    let server_x509 = x509(&engine, &server).await;
    let other_x509 = x509(&engine, &other).await;
    let intermediate_x509 = x509(&engine, &intermediate).await;

    engine.revoke_certificate(server.id, &cancel).await.unwrap();
    let pem = engine
        .get_revoked_certificates_list(intermediate.id, &cancel)
        .await
        .unwrap();

    let crl = X509Crl::from_pem(pem.as_bytes()).expect("Failed to parse CRL");
    assert!(crl.verify(&intermediate_x509.public_key().unwrap()).unwrap());

    let root_x509 = x509(&engine, &root).await;
    assert!(!crl.verify(&root_x509.public_key().unwrap()).unwrap_or(false));

    let serials: Vec<String> = crl
        .get_revoked()
        .expect("revoked entries")
        .iter()
        .map(|revoked| {
            revoked
                .serial_number()
                .to_bn()
                .unwrap()
                .to_dec_str()
                .unwrap()
                .to_string()
        })
        .collect();
    assert_eq!(serials, vec![server.serial.clone()]);

    assert!(matches!(crl.get_by_cert(&server_x509), CrlStatus::Revoked(_)));
    assert!(matches!(crl.get_by_cert(&other_x509), CrlStatus::NotRevoked));
}

#[tokio::test]
async fn test_openssl_reads_empty_revocation_list() {
    let engine = util::engine();
    let cancel = CancellationToken::new();
    let root = util::create(&engine, util::root("empty.local", 30)).await;

    let pem = engine
        .get_revoked_certificates_list(root.id, &cancel)
        .await
        .unwrap();
    let crl = X509Crl::from_pem(pem.as_bytes()).unwrap();
    assert!(crl.get_revoked().is_none_or(|revoked| revoked.is_empty()));
    assert!(crl.next_update().is_none());

    let root_x509 = x509(&engine, &root).await;
    assert!(crl.verify(&root_x509.public_key().unwrap()).unwrap());
}
