//! Writes the generated CA certificate out so it can be bind-mounted into
//! the child's trust anchor directory. Installing it there (update-ca-
//! certificates, or whatever the child's environment expects) is left to
//! the caller; this module only produces the bytes.

use std::io;
use std::path::Path;

use crate::ca::CertificateAuthority;

pub fn write_ca_cert(ca: &CertificateAuthority, path: &Path) -> io::Result<()> {
    std::fs::write(path, ca.root_cert_pem())
}
